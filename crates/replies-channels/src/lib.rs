pub mod error;
pub mod outbound;
pub mod payload;
pub mod signature;
pub mod types;

pub use error::ChannelError;
pub use outbound::{HttpOutboundSender, OutboundSender};
pub use payload::{parse_form_urlencoded, EmailAdapter, PayloadAdapter, SmsAdapter, WhatsAppAdapter};
pub use signature::{sorted_params, SignatureVerifier};
pub use types::{InboundFragment, OutboundReply};
