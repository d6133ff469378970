//! `replies-process` — drives one reply-processing turn per trigger.
//!
//! # Overview
//!
//! A worker receives a `ConversationKey` trigger off a per-channel delay
//! queue and hands it to [`ProcessingCoordinator::process`], which owns the
//! whole lifecycle: acquire the processing lease, keep the queue message's
//! visibility alive for the duration, drain and merge the staged fragments
//! that triggered this wake-up, drive the AI assistant through one turn,
//! send the reply back through the channel provider, commit the turn
//! atomically, and clean up.

pub mod coordinator;
pub mod error;
pub mod merger;

pub use coordinator::{AssistantDriverFactory, ChannelSenderFactory, ProcessingCoordinator};
pub use error::ProcessingError;
pub use merger::BatchMerger;
