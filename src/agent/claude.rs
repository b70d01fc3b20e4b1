use super::process::{run_command, CommandOutput};
use super::{AgentCommand, AnswerFuture, AnswerService};
use crate::config::{AppConfig, ENV_API_KEY};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::AgentReply;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Drives a headless `claude` CLI that answers questions by querying the store with sqlite3.
#[derive(Debug, Clone)]
pub struct ClaudeCliAgent {
    binary_path: String,
    model: Option<String>,
    api_key: Option<String>,
    db_path: PathBuf,
    schema: String,
    timeout: Option<Duration>,
}

impl ClaudeCliAgent {
    pub fn new(config: &AppConfig, db: &Database) -> AppResult<Self> {
        Ok(Self {
            binary_path: config.agent_binary.clone(),
            model: Some(config.agent_model.clone()).filter(|model| !model.trim().is_empty()),
            api_key: config.api_key.clone(),
            db_path: db.path().to_path_buf(),
            schema: db.schema_description()?,
            timeout: config.agent_timeout(),
        })
    }

    pub fn schema_info(&self) -> &str {
        &self.schema
    }

    pub fn build_prompt(&self, question: &str) -> String {
        format!(
            "You answer questions about a ground-penetrating-radar road defect inventory stored in the \
SQLite database at {db}.\n\
Run read-only queries with `sqlite3 {db} \"<SQL>\"`. Never modify data.\n\n\
Schema:\n{schema}\n\n\
Work in this format, repeating Action/Action Input/Observation as needed:\n\
Thought: what you need to find out\n\
Action: sql_db_query\n\
Action Input: the single-line SQL statement you run\n\
Observation: the result\n\
...\n\
Final Answer: the answer for a non-technical reader\n\n\
Question: {question}",
            db = self.db_path.display(),
            schema = self.schema,
            question = question.trim(),
        )
    }

    pub fn build_command(&self, question: &str) -> AppResult<AgentCommand> {
        self.validate(question)?;

        let mut args = vec!["-p".to_string(), self.build_prompt(question)];
        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args.push("--output-format".to_string());
        args.push("text".to_string());
        args.push("--allowedTools".to_string());
        args.push("Bash(sqlite3:*)".to_string());

        let mut env = BTreeMap::new();
        env.insert("CLAUDE_NON_INTERACTIVE".to_string(), "1".to_string());
        if let Some(key) = &self.api_key {
            env.insert(ENV_API_KEY.to_string(), key.clone());
        }

        Ok(AgentCommand {
            program: self.binary_path.clone(),
            args,
            cwd: self
                .db_path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(|parent| parent.to_path_buf()),
            env,
            stdin: None,
        })
    }

    async fn run(&self, question: &str) -> AppResult<AgentReply> {
        let command = self.build_command(question)?;
        tracing::info!(program = %command.program, "asking agent");
        let output = run_command(&command, self.timeout).await?;
        parse_reply(&output)
    }
}

impl AnswerService for ClaudeCliAgent {
    fn answer<'a>(&'a self, question: &'a str) -> AnswerFuture<'a> {
        Box::pin(self.run(question))
    }
}

/// Splits CLI output into the answer text and the trace the extractor scans.
pub fn parse_reply(output: &CommandOutput) -> AppResult<AgentReply> {
    if !output.success() {
        let detail = output
            .stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("no error output");
        return Err(AppError::Agent(format!(
            "agent exited with code {}: {}",
            output
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "none".to_string()),
            detail.trim()
        )));
    }

    let stdout = output.stdout.trim();
    if stdout.is_empty() {
        return Err(AppError::Agent("agent returned no output".to_string()));
    }

    let text = match stdout.rfind(FINAL_ANSWER_MARKER) {
        Some(index) => stdout[index + FINAL_ANSWER_MARKER.len()..].trim(),
        None => stdout,
    };
    if text.is_empty() {
        return Err(AppError::Agent("agent returned an empty final answer".to_string()));
    }

    let mut trace = output.stdout.clone();
    if !output.stderr.trim().is_empty() {
        trace.push('\n');
        trace.push_str(&output.stderr);
    }

    Ok(AgentReply {
        text: text.to_string(),
        trace,
    })
}
