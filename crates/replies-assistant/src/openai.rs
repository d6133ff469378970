use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::provider::AssistantProvider;
use crate::types::{AssistantMessage, Run, RunStatus};

/// `AssistantProvider` backed by the OpenAI Assistants API (threads, runs,
/// messages). `OpenAI-Beta: assistants=v2` is required on every request —
/// the API is still versioned behind that header.
pub struct OpenAiAssistantProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistantProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
    ) -> Result<T> {
        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(AssistantError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "OpenAI assistants API error");
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|e| AssistantError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AssistantProvider for OpenAiAssistantProvider {
    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()> {
        debug!(thread_id, "appending user message to thread");
        let resp = self
            .request(reqwest::Method::POST, &format!("/v1/threads/{thread_id}/messages"))
            .json(&serde_json::json!({ "role": "user", "content": content }))
            .send()
            .await?;
        let _: MessageResponse = Self::handle_response(resp).await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<Run> {
        debug!(thread_id, assistant_id, "creating run");
        let resp = self
            .request(reqwest::Method::POST, &format!("/v1/threads/{thread_id}/runs"))
            .json(&serde_json::json!({ "assistant_id": assistant_id }))
            .send()
            .await?;
        let run: RunResponse = Self::handle_response(resp).await?;
        Ok(run.into_run(thread_id))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/threads/{thread_id}/runs/{run_id}"),
            )
            .send()
            .await?;
        let run: RunResponse = Self::handle_response(resp).await?;
        Ok(run.into_run(thread_id))
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<AssistantMessage>> {
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/threads/{thread_id}/messages?order=desc&limit=20"),
            )
            .send()
            .await?;
        let list: MessageListResponse = Self::handle_response(resp).await?;
        Ok(list
            .data
            .into_iter()
            .map(|m| AssistantMessage {
                id: m.id,
                role: m.role,
                content: m
                    .content
                    .into_iter()
                    .find_map(|block| block.text.map(|t| t.value))
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/threads/{thread_id}/runs/{run_id}/cancel"),
            )
            .send()
            .await?;
        let _: RunResponse = Self::handle_response(resp).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct MessageResponse {
    #[allow(dead_code)]
    id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    id: String,
    status: String,
    last_error: Option<RunError>,
    usage: Option<RunUsage>,
}

impl RunResponse {
    fn into_run(self, thread_id: &str) -> Run {
        let status = parse_status(&self.status);
        Run {
            id: self.id,
            thread_id: thread_id.to_string(),
            status,
            last_error: self.last_error.map(|e| e.message),
            usage_total_tokens: self.usage.map(|u| u.total_tokens),
        }
    }
}

#[derive(Deserialize)]
struct RunError {
    message: String,
}

#[derive(Deserialize)]
struct RunUsage {
    total_tokens: u32,
}

fn parse_status(s: &str) -> RunStatus {
    match s {
        "queued" => RunStatus::Queued,
        "in_progress" => RunStatus::InProgress,
        "requires_action" => RunStatus::RequiresAction,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        "cancelling" => RunStatus::Cancelling,
        "cancelled" => RunStatus::Cancelled,
        "expired" => RunStatus::Expired,
        other => {
            warn!(status = other, "unrecognized run status, treating as failed");
            RunStatus::Failed
        }
    }
}

#[derive(Deserialize)]
struct MessageListResponse {
    data: Vec<MessageData>,
}

#[derive(Deserialize)]
struct MessageData {
    id: String,
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<TextBlock>,
}

#[derive(Deserialize)]
struct TextBlock {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_maps_known_variants() {
        assert_eq!(parse_status("completed"), RunStatus::Completed);
        assert_eq!(parse_status("in_progress"), RunStatus::InProgress);
        assert!(parse_status("completed").is_terminal());
        assert!(!parse_status("in_progress").is_terminal());
    }

    #[test]
    fn parse_status_unknown_value_is_treated_as_failed() {
        assert_eq!(parse_status("something_new"), RunStatus::Failed);
    }
}
