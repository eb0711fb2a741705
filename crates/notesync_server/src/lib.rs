//! # notesync sync server
//!
//! Reference implementation of the push and pull endpoints.
//!
//! This crate provides:
//! - An append-only server oplog with monotonically increasing sequences
//! - Idempotent, atomic push batches
//! - Bounded pulls with `has_more` paging
//! - A last-writer-wins view of every entity
//!
//! # Protocol
//!
//! Checkpoints handed to clients are decimal oplog sequence numbers. A pull
//! returns changes with a sequence greater than the checkpoint. A push is
//! keyed per change by `(device_id, entity_id, client_timestamp)`; resending
//! a change that was already accepted is acknowledged without appending it
//! again.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod oplog;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{DeviceSession, HandlerContext, RequestHandler};
pub use oplog::{AppendOutcome, ServerOplog};
pub use server::{Reply, SyncServer, PULL_ENDPOINT, PUSH_ENDPOINT};
