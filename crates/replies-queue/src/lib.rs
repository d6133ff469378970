//! `replies-queue` — SQLite-backed delay queue with visibility timeouts.
//!
//! # Overview
//!
//! Each channel gets its own named queue inside one `queue_messages` table.
//! `enqueue` schedules a message to become visible after a delay;
//! `receive` hands back the oldest visible message and hides it again for
//! a visibility window; `extend_visibility` lets a long-running consumer
//! keep hold of it; `delete` removes it once processing succeeds. Messages
//! that exceed `max_receive_count` are moved to `dead_letters` instead of
//! being handed out again.

pub mod db;
pub mod error;
pub mod heartbeat;
pub mod queue;
pub mod trigger;
pub mod types;

pub use error::{QueueError, Result};
pub use heartbeat::VisibilityHeartbeat;
pub use queue::{QueueConsumer, QueueProducer, SqliteQueue};
pub use trigger::{decode_trigger, TriggerScheduler};
pub use types::{DeadLetter, QueueMessage};
