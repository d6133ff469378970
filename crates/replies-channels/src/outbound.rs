use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use tracing::{info, instrument, warn};

use crate::error::{ChannelError, Result};
use crate::types::OutboundReply;

const MAX_SEND_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 1.0;
const BACKOFF_MAX_SECS: f64 = 5.0;
const JITTER_FRACTION: f64 = 0.10;

/// Sends a composed reply back through its channel provider.
#[async_trait]
pub trait OutboundSender: Send + Sync {
    async fn send(&self, reply: &OutboundReply) -> Result<String>;
}

/// reqwest-based sender hitting a single provider webhook URL per channel.
/// Retries transient failures (network errors, 5xx, 429) with exponential
/// backoff and jitter; 4xx other than 429 fails immediately since retrying
/// an identical request will not change the outcome.
pub struct HttpOutboundSender {
    client: Client,
    endpoint: String,
    bearer_token: String,
}

impl HttpOutboundSender {
    pub fn new(client: Client, endpoint: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            bearer_token: bearer_token.into(),
        }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let raw = BACKOFF_BASE_SECS * 2f64.powi(attempt as i32 - 1);
        let capped = raw.min(BACKOFF_MAX_SECS);
        let jitter = capped * JITTER_FRACTION;
        let jittered = capped + rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[async_trait]
impl OutboundSender for HttpOutboundSender {
    #[instrument(skip(self, reply), fields(channel = %reply.channel, to = %reply.to_identifier))]
    async fn send(&self, reply: &OutboundReply) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_SEND_ATTEMPTS {
            let outcome = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.bearer_token)
                .form(&[
                    ("From", reply.from_identifier.as_str()),
                    ("To", reply.to_identifier.as_str()),
                    ("Body", reply.body.as_str()),
                ])
                .send()
                .await;

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let provider_id = response
                            .text()
                            .await
                            .unwrap_or_default();
                        info!(attempt, "reply send succeeded");
                        return Ok(provider_id);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        last_error = format!("transient provider error: {status}");
                        warn!(attempt, %status, "transient send failure, will retry");
                    } else {
                        return Err(ChannelError::SendRejected(format!(
                            "provider rejected send: {status}"
                        )));
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = %e, "network error sending reply, will retry");
                }
            }

            if attempt < MAX_SEND_ATTEMPTS {
                tokio::time::sleep(Self::backoff_delay(attempt)).await;
            }
        }

        Err(ChannelError::SendRetriesExhausted {
            attempts: MAX_SEND_ATTEMPTS,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_grows_and_stays_capped() {
        let d1 = HttpOutboundSender::backoff_delay(1);
        let d2 = HttpOutboundSender::backoff_delay(2);
        let d3 = HttpOutboundSender::backoff_delay(3);

        assert!(d1.as_secs_f64() <= BACKOFF_BASE_SECS * (1.0 + JITTER_FRACTION) + 0.01);
        assert!(d2.as_secs_f64() <= BACKOFF_BASE_SECS * 2.0 * (1.0 + JITTER_FRACTION) + 0.01);
        assert!(d3.as_secs_f64() <= BACKOFF_MAX_SECS * (1.0 + JITTER_FRACTION) + 0.01);
    }
}
