use crate::agent::AnswerService;
use crate::errors::{AppError, AppResult};
use crate::extractor::extract_sql;
use crate::history::InteractionHistory;
use crate::models::Interaction;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const EXAMPLE_QUESTIONS: [&str; 6] = [
    "How many defects total?",
    "Show all critical cavities",
    "Average repair cost by type",
    "Which roads need urgent repairs?",
    "Count defects by severity",
    "Show defects in Gangnam-daero",
];

/// One interactive user: at most one question in flight at a time.
#[derive(Clone)]
pub struct QuerySession {
    service: Arc<dyn AnswerService>,
    in_flight: Arc<Mutex<()>>,
}

impl QuerySession {
    pub fn new(service: Arc<dyn AnswerService>) -> Self {
        Self {
            service,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Asks one question and records the outcome in `history`.
    ///
    /// Collaborator failures are not returned as errors: they become an
    /// interaction whose answer is the error text. Only an empty question or a
    /// second concurrent question is rejected.
    pub async fn ask(&self, question: &str, history: &mut InteractionHistory) -> AppResult<Interaction> {
        let question = question.trim();
        self.service.validate(question)?;

        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| AppError::Busy("Another question is still being answered".to_string()))?;

        let started = std::time::Instant::now();
        let interaction = match self.service.answer(question).await {
            Ok(reply) => {
                let sql = extract_sql(&reply.trace);
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    sql_statements = sql.as_ref().map(Vec::len).unwrap_or(0),
                    "question answered"
                );
                Interaction {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now(),
                    question: question.to_string(),
                    answer: reply.text,
                    sql,
                    failed: false,
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "question failed");
                Interaction {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now(),
                    question: question.to_string(),
                    answer: format!("Error: {}", error),
                    sql: None,
                    failed: true,
                }
            }
        };

        history.push(interaction.clone());
        Ok(interaction)
    }
}

#[cfg(test)]
mod tests {
    use super::QuerySession;
    use crate::agent::{AnswerFuture, AnswerService};
    use crate::errors::AppError;
    use crate::history::InteractionHistory;
    use crate::models::AgentReply;
    use std::sync::Arc;
    use tokio::sync::Notify;

    struct ScriptedAgent {
        reply: Result<AgentReply, String>,
        release: Option<Arc<Notify>>,
    }

    impl AnswerService for ScriptedAgent {
        fn answer<'a>(&'a self, _question: &'a str) -> AnswerFuture<'a> {
            Box::pin(async move {
                if let Some(release) = &self.release {
                    release.notified().await;
                }
                self.reply.clone().map_err(AppError::Agent)
            })
        }
    }

    fn replying(text: &str, trace: &str) -> Arc<ScriptedAgent> {
        Arc::new(ScriptedAgent {
            reply: Ok(AgentReply {
                text: text.to_string(),
                trace: trace.to_string(),
            }),
            release: None,
        })
    }

    #[tokio::test]
    async fn records_answer_and_extracted_sql() {
        let session = QuerySession::new(replying(
            "There are 142 defects.",
            "Action Input: SELECT COUNT(*) FROM defects\nObservation: 142",
        ));
        let mut history = InteractionHistory::new();

        let interaction = session.ask("  How many defects total? ", &mut history).await.expect("ask");
        assert_eq!(interaction.question, "How many defects total?");
        assert_eq!(interaction.answer, "There are 142 defects.");
        assert!(!interaction.failed);
        let sql = interaction.sql.expect("sql");
        assert_eq!(sql[0], "SELECT COUNT(*) FROM defects");
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn trace_without_sql_records_none() {
        let session = QuerySession::new(replying("I could not tell.", "Thought: nothing to run"));
        let mut history = InteractionHistory::new();
        let interaction = session.ask("Hello?", &mut history).await.expect("ask");
        assert!(interaction.sql.is_none());
    }

    #[tokio::test]
    async fn collaborator_failure_becomes_error_text() {
        let session = QuerySession::new(Arc::new(ScriptedAgent {
            reply: Err("rate limited".to_string()),
            release: None,
        }));
        let mut history = InteractionHistory::new();

        let interaction = session.ask("Show all critical cavities", &mut history).await.expect("ask");
        assert!(interaction.failed);
        assert!(interaction.answer.starts_with("Error: "));
        assert!(interaction.answer.contains("rate limited"));
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn rejects_empty_question_without_recording() {
        let session = QuerySession::new(replying("unused", ""));
        let mut history = InteractionHistory::new();
        let result = session.ask("   ", &mut history).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn second_concurrent_question_is_busy() {
        let release = Arc::new(Notify::new());
        let session = QuerySession::new(Arc::new(ScriptedAgent {
            reply: Ok(AgentReply {
                text: "done".to_string(),
                trace: String::new(),
            }),
            release: Some(release.clone()),
        }));
        let mut first_history = InteractionHistory::new();
        let mut second_history = InteractionHistory::new();

        let first = session.ask("first", &mut first_history);
        let second = async {
            tokio::task::yield_now().await;
            let result = session.ask("second", &mut second_history).await;
            release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.expect("first").answer, "done");
        assert!(matches!(second, Err(AppError::Busy(_))));
        assert!(second_history.is_empty());
    }
}
