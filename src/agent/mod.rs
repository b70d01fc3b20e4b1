pub mod claude;
pub mod process;

use crate::errors::{AppError, AppResult};
use crate::models::AgentReply;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

pub use claude::ClaudeCliAgent;

pub type AnswerFuture<'a> = Pin<Box<dyn Future<Output = AppResult<AgentReply>> + Send + 'a>>;

/// The external question answering collaborator.
///
/// Implementations decide which SQL to run and how; callers only see the final
/// answer text and an unstructured trace.
pub trait AnswerService: Send + Sync {
    fn validate(&self, question: &str) -> AppResult<()> {
        if question.trim().is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }
        Ok(())
    }

    fn answer<'a>(&'a self, question: &'a str) -> AnswerFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<String>,
}
