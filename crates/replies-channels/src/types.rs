use replies_core::types::Channel;
use serde::{Deserialize, Serialize};

/// A single inbound reply fragment, normalized from a WhatsApp/SMS/email
/// webhook payload into the shape every downstream component understands.
///
/// `PayloadAdapter` implementations are the only place that ever see a
/// provider's native field names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InboundFragment {
    pub channel: Channel,
    /// Provider-assigned identifier for this specific fragment, used for
    /// ordering and dedup (e.g. Twilio's `MessageSid`).
    pub message_sid: String,
    /// The user-side identifier the reply arrived from.
    pub from_identifier: String,
    /// The company-side identifier the reply was sent to.
    pub to_identifier: String,
    pub body: String,
}

/// A reply ready to send back through a channel provider.
#[derive(Debug, Clone)]
pub struct OutboundReply {
    pub channel: Channel,
    pub to_identifier: String,
    pub from_identifier: String,
    pub body: String,
}
