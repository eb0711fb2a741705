//! # notesync protocol
//!
//! Sync protocol types shared by the notesync client engine and server.
//!
//! This crate provides:
//! - [`EntityId`] and [`DeviceId`] identifiers
//! - Strongly-typed entity payloads ([`EntityPayload`])
//! - [`Delta`], a single recorded local mutation
//! - [`Checkpoint`], the opaque pull cursor
//! - Push and pull wire messages (JSON)
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod delta;
mod entity;
mod error;
mod id;
mod messages;

pub use checkpoint::Checkpoint;
pub use delta::{ChangeKey, Delta, Operation};
pub use entity::{EntityPayload, EntityType, Note, Reflection, Relation, RelationKind};
pub use error::{ProtocolError, ProtocolResult};
pub use id::{DeviceId, EntityId};
pub use messages::{
    PullRequest, PullResponse, PushRequest, PushResponse, RejectedChange, WireMessage,
};
