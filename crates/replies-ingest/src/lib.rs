//! `replies-ingest` — authenticates and stages one inbound webhook fragment.
//!
//! # Overview
//!
//! `IngestCoordinator::ingest` is the whole pipeline behind `POST
//! /{channel}`: parse the provider's native payload, resolve it to a known
//! conversation, verify the webhook signature, stage the fragment, and
//! schedule at most one delayed trigger per batching burst. Every exit path
//! is meant to be followed by an empty HTTP 200 ack regardless of outcome —
//! the caller logs the `Result`, it never shapes the response.

pub mod coordinator;
pub mod error;

pub use coordinator::IngestCoordinator;
pub use error::IngestError;
