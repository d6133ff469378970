use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::error::{AssistantError, Result};
use crate::provider::AssistantProvider;
use crate::types::RunStatus;

const POLL_INTERVAL_INITIAL_MS: u64 = 500;
const POLL_BACKOFF_FACTOR: f64 = 1.5;
const POLL_INTERVAL_MAX_MS: u64 = 5000;

/// Outcome of a completed assistant turn: the text to send back and the
/// token usage to fold into the conversation's running total.
#[derive(Debug)]
pub struct TurnOutcome {
    pub reply_text: String,
    pub total_tokens: u32,
}

/// Drives one full turn against an `AssistantProvider`: append the merged
/// user message, start a run, poll it to completion within a wall-clock
/// budget, and extract the assistant's reply text.
pub struct AssistantDriver {
    provider: Arc<dyn AssistantProvider>,
    poll_budget: Duration,
}

impl AssistantDriver {
    pub fn new(provider: Arc<dyn AssistantProvider>, poll_budget: Duration) -> Self {
        Self { provider, poll_budget }
    }

    #[instrument(skip(self, merged_text), fields(thread_id))]
    pub async fn run_turn(
        &self,
        thread_id: &str,
        assistant_id: &str,
        merged_text: &str,
    ) -> Result<TurnOutcome> {
        self.provider.append_message(thread_id, merged_text).await?;
        let run = self.provider.create_run(thread_id, assistant_id).await?;

        let deadline = tokio::time::Instant::now() + self.poll_budget;
        let mut interval_ms = POLL_INTERVAL_INITIAL_MS;
        let mut final_run = run.clone_status_only();

        loop {
            let current = self.provider.get_run(thread_id, &run.id).await?;
            if current.status.is_terminal() {
                final_run = current;
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(thread_id, run_id = %run.id, "run exceeded poll budget, cancelling");
                if let Err(e) = self.provider.cancel_run(thread_id, &run.id).await {
                    warn!(thread_id, run_id = %run.id, error = %e, "best-effort run cancel failed");
                }
                return Err(AssistantError::Timeout {
                    thread_id: thread_id.to_string(),
                    run_id: run.id.clone(),
                    waited_secs: self.poll_budget.as_secs(),
                });
            }

            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            interval_ms = ((interval_ms as f64) * POLL_BACKOFF_FACTOR) as u64;
            interval_ms = interval_ms.min(POLL_INTERVAL_MAX_MS);
        }

        if final_run.status != RunStatus::Completed {
            return Err(AssistantError::RunFailed {
                thread_id: thread_id.to_string(),
                run_id: run.id.clone(),
                reason: final_run
                    .last_error
                    .unwrap_or_else(|| format!("run ended in status {:?}", final_run.status)),
            });
        }

        let messages = self.provider.list_messages(thread_id).await?;
        let mut assistant_messages = messages.into_iter().filter(|m| m.role == "assistant").peekable();

        if assistant_messages.peek().is_none() {
            return Err(AssistantError::ResponseMalformed(
                "no assistant message on thread".to_string(),
            ));
        }

        let parsed = assistant_messages.find_map(|m| {
            if m.content.trim().is_empty() {
                return None;
            }
            serde_json::from_str::<ReplyContent>(&m.content).ok()
        });

        let Some(parsed) = parsed else {
            return Err(AssistantError::ResponseMalformed(
                "no assistant message with extractable JSON content".to_string(),
            ));
        };

        info!(thread_id, run_id = %run.id, "assistant turn completed");
        Ok(TurnOutcome {
            reply_text: parsed.content,
            total_tokens: final_run.usage_total_tokens.unwrap_or(0),
        })
    }
}

/// Shape the assistant is instructed to reply in — a JSON envelope rather
/// than bare text, so future fields (tone, confidence) can ride along
/// without a wire break.
#[derive(serde::Deserialize)]
struct ReplyContent {
    content: String,
}

impl crate::types::Run {
    fn clone_status_only(&self) -> Self {
        Self {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            status: self.status,
            last_error: self.last_error.clone(),
            usage_total_tokens: self.usage_total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssistantMessage;
    use async_trait::async_trait;

    struct StubProvider {
        messages: Vec<AssistantMessage>,
    }

    #[async_trait]
    impl AssistantProvider for StubProvider {
        async fn append_message(&self, _thread_id: &str, _content: &str) -> Result<()> {
            Ok(())
        }
        async fn create_run(&self, thread_id: &str, _assistant_id: &str) -> Result<crate::types::Run> {
            Ok(crate::types::Run {
                id: "run_1".to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Completed,
                last_error: None,
                usage_total_tokens: Some(10),
            })
        }
        async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<crate::types::Run> {
            Ok(crate::types::Run {
                id: run_id.to_string(),
                thread_id: thread_id.to_string(),
                status: RunStatus::Completed,
                last_error: None,
                usage_total_tokens: Some(10),
            })
        }
        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<AssistantMessage>> {
            Ok(self.messages.clone())
        }
        async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<()> {
            Ok(())
        }
    }

    fn msg(role: &str, content: &str) -> AssistantMessage {
        AssistantMessage {
            id: "msg".to_string(),
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn skips_newest_non_json_assistant_message() {
        let driver = AssistantDriver::new(
            Arc::new(StubProvider {
                messages: vec![
                    msg("assistant", "thinking out loud, not JSON"),
                    msg("assistant", r#"{"content":"hello there"}"#),
                ],
            }),
            Duration::from_secs(5),
        );

        let outcome = driver.run_turn("thread_1", "asst_1", "hi").await.unwrap();
        assert_eq!(outcome.reply_text, "hello there");
    }

    #[tokio::test]
    async fn no_extractable_json_is_malformed() {
        let driver = AssistantDriver::new(
            Arc::new(StubProvider {
                messages: vec![msg("assistant", "not json"), msg("user", "hi")],
            }),
            Duration::from_secs(5),
        );

        let err = driver.run_turn("thread_1", "asst_1", "hi").await.unwrap_err();
        assert!(matches!(err, AssistantError::ResponseMalformed(_)));
    }
}
