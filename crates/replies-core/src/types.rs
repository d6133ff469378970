use serde::{Deserialize, Serialize};
use std::fmt;

/// Messaging channel a fragment or conversation belongs to.
///
/// The channel is chosen from the inbound request path (`/whatsapp`, `/sms`,
/// `/email`) and is the only piece of channel-specific routing that survives
/// past `PayloadAdapter` — every downstream component sees a uniform
/// `InboundFragment` regardless of which variant this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    WhatsApp,
    Sms,
    Email,
}

impl Channel {
    /// Parse the channel from the `/{channel}` path segment.
    pub fn from_path_segment(s: &str) -> Option<Self> {
        match s {
            "whatsapp" => Some(Self::WhatsApp),
            "sms" => Some(Self::Sms),
            "email" => Some(Self::Email),
            _ => None,
        }
    }

    pub fn as_path_segment(&self) -> &'static str {
        match self {
            Self::WhatsApp => "whatsapp",
            Self::Sms => "sms",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_path_segment())
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path_segment(s).ok_or_else(|| format!("unknown channel: {s}"))
    }
}

/// Composite identity of a `ConversationRecord`: `(primary_channel, conversation_id)`.
///
/// `primary_channel` is the user-side identifier (e.g. a WhatsApp E.164
/// number); `conversation_id` is the composite conversation identifier
/// assigned by the outbound engine when the conversation was seeded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub primary_channel: String,
    pub conversation_id: String,
}

impl ConversationKey {
    pub fn new(primary_channel: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            primary_channel: primary_channel.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.primary_channel, self.conversation_id)
    }
}

/// Current RFC3339/ISO-8601 UTC timestamp, the format used for every
/// persisted timestamp in this codebase.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}
