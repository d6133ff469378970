use serde::{Deserialize, Serialize};

use replies_core::secrets::SecretRef;

/// `conversation_status` doubles as the processing lease:
/// `processing_reply` means exactly one processor currently holds the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Seeded by the outbound engine; no reply turn has started yet.
    TemplateSent,
    /// A processor holds the lease and is driving a turn.
    ProcessingReply,
    /// The most recent turn committed successfully.
    ReplySent,
    /// A turn failed after acquiring the lease; eligible for redrive.
    Retry,
    /// Routing gate — replies are diverted to a human, never processed here.
    HandoffRequired,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateSent => "template_sent",
            Self::ProcessingReply => "processing_reply",
            Self::ReplySent => "reply_sent",
            Self::Retry => "retry",
            Self::HandoffRequired => "handoff_required",
        }
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template_sent" => Ok(Self::TemplateSent),
            "processing_reply" => Ok(Self::ProcessingReply),
            "reply_sent" => Ok(Self::ReplySent),
            "retry" => Ok(Self::Retry),
            "handoff_required" => Ok(Self::HandoffRequired),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single turn entry in `ConversationRecord::messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// The inbound message_sid(s) this entry was merged from, or the
    /// provider-issued outbound id for an assistant entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub message_sids: Vec<String>,
}

/// Channel-provider parameters for sending the reply back to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Company-side identifier used as the `from` address on outbound sends.
    pub company_identifier: String,
    pub credential_ref: SecretRef,
}

/// AI-provider parameters for driving the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub credential_ref: SecretRef,
    pub assistant_id: String,
    /// Opaque AI-side thread handle. Set during outbound seeding; never
    /// overwritten by reply processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// The durable per-conversation record shared with the outbound engine.
///
/// Identity is `(primary_channel, conversation_id)`. `messages` is
/// append-only; every successful commit appends exactly one user turn and
/// one assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub primary_channel: String,
    pub conversation_id: String,
    pub messages: Vec<Message>,
    pub conversation_status: ConversationStatus,
    pub channel_config: ChannelConfig,
    pub ai_config: AiConfig,
    pub hand_off_to_human: bool,
    /// Rolling total of tokens consumed across every turn.
    pub total_tokens: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationRecord {
    /// A record only reaches reply processing once `thread_id` is populated.
    pub fn is_ready_for_processing(&self) -> bool {
        self.ai_config.thread_id.is_some() && !self.hand_off_to_human
    }
}
