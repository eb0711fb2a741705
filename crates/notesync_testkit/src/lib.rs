//! # notesync testkit
//!
//! Test utilities for notesync.
//!
//! This crate provides:
//! - An in-process endpoint wiring client transports to the reference server
//! - Device and cluster fixtures
//! - Fault injection for the HTTP layer
//! - Property-based test generators using proptest
//! - A multi-device simulation with a convergence check
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notesync_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn two_devices() {
//!     let cluster = TestCluster::new(2);
//!     cluster.device(0).local.create(EntityPayload::note("t", "b"), Utc::now());
//!     cluster.settle().await;
//!     assert!(cluster.converged());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod endpoint;
pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod simulation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::endpoint::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::simulation::*;
}

pub use endpoint::*;
pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use simulation::*;
