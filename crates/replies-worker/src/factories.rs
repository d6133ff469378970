use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use replies_assistant::{AssistantDriver, OpenAiAssistantProvider};
use replies_channels::outbound::OutboundSender;
use replies_channels::HttpOutboundSender;
use replies_core::config::OutboundConfig;
use replies_core::types::Channel;
use replies_process::{AssistantDriverFactory, ChannelSenderFactory};

/// Builds an `AssistantDriver` backed by the OpenAI Assistants API for
/// whichever conversation's credential the coordinator just resolved.
pub struct OpenAiDriverFactory {
    client: Client,
    poll_budget: Duration,
}

impl OpenAiDriverFactory {
    pub fn new(client: Client, poll_budget: Duration) -> Self {
        Self { client, poll_budget }
    }
}

impl AssistantDriverFactory for OpenAiDriverFactory {
    fn build(&self, api_key: &str) -> AssistantDriver {
        let provider = Arc::new(OpenAiAssistantProvider::new(self.client.clone(), api_key));
        AssistantDriver::new(provider, self.poll_budget)
    }
}

/// Builds an `HttpOutboundSender` pointed at the provider endpoint
/// configured for `channel`.
pub struct HttpSenderFactory {
    client: Client,
    outbound: OutboundConfig,
}

impl HttpSenderFactory {
    pub fn new(client: Client, outbound: OutboundConfig) -> Self {
        Self { client, outbound }
    }
}

impl ChannelSenderFactory for HttpSenderFactory {
    fn build(&self, channel: Channel, token: &str) -> Arc<dyn OutboundSender> {
        Arc::new(HttpOutboundSender::new(
            self.client.clone(),
            self.outbound.endpoint_for(channel),
            token,
        ))
    }
}
