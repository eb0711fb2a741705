//! Request handlers for sync endpoints.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::oplog::ServerOplog;
use chrono::{DateTime, Utc};
use notesync_protocol::{
    Checkpoint, DeviceId, PullRequest, PullResponse, PushRequest, PushResponse,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Server oplog (shared across all handlers).
    pub oplog: Arc<ServerOplog>,
    /// Device sessions (device_id -> session info).
    sessions: RwLock<HashMap<DeviceId, DeviceSession>>,
}

/// What the server knows about a pushing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSession {
    /// Number of push requests received.
    pub pushes: u64,
    /// Checkpoint the device reported on its last push.
    pub last_checkpoint: u64,
    /// When the device last pushed.
    pub last_seen: DateTime<Utc>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, oplog: Arc<ServerOplog>) -> Self {
        Self {
            config,
            oplog,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the session of a device, if it has pushed.
    pub fn session(&self, device_id: &DeviceId) -> Option<DeviceSession> {
        self.sessions.read().get(device_id).copied()
    }

    fn record_push(&self, device_id: DeviceId, checkpoint: u64) {
        let now = Utc::now();
        self.sessions
            .write()
            .entry(device_id)
            .and_modify(|s| {
                s.pushes += 1;
                s.last_checkpoint = checkpoint;
                s.last_seen = now;
            })
            .or_insert(DeviceSession {
                pushes: 1,
                last_checkpoint: checkpoint,
                last_seen: now,
            });
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("config", &self.config)
            .field("sequence", &self.oplog.sequence())
            .field("sessions", &self.sessions.read().len())
            .finish()
    }
}

/// Handler for sync requests.
#[derive(Debug)]
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Returns the shared context.
    pub fn context(&self) -> &Arc<HandlerContext> {
        &self.context
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        let after = parse_checkpoint(&request.checkpoint)?;
        let max = self.context.config.max_pull_batch;
        let limit = request.limit.unwrap_or(max).clamp(1, max);

        let (changes, last, has_more) = self.context.oplog.changes_since(after, limit);
        let next_checkpoint = if changes.is_empty() {
            request.checkpoint
        } else {
            Checkpoint::new(last.to_string())
        };
        debug!(
            after,
            returned = changes.len(),
            has_more,
            "pull served"
        );

        Ok(PullResponse::new(changes, next_checkpoint, has_more))
    }

    /// Handles a push request.
    ///
    /// Every change must originate from the pushing device.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        let max = self.context.config.max_push_batch;
        if request.changes.len() > max as usize {
            warn!(count = request.changes.len(), max, "push batch too large");
            return Err(ServerError::BatchTooLarge {
                count: request.changes.len(),
                max,
            });
        }
        if let Some(foreign) = request
            .changes
            .iter()
            .find(|d| d.device_id() != request.device_id)
        {
            return Err(ServerError::InvalidRequest(format!(
                "change from device {} pushed by {}",
                foreign.device_id(),
                request.device_id
            )));
        }
        let reported = parse_checkpoint(&request.checkpoint)?;

        let outcome = self.context.oplog.append(&request.changes);
        self.context.record_push(request.device_id, reported);

        let sequence = self.context.oplog.sequence();
        info!(
            device = %request.device_id,
            appended = outcome.appended,
            duplicates = outcome.duplicates,
            rejected = outcome.rejected.len(),
            sequence,
            "push accepted"
        );

        Ok(PushResponse {
            accepted: outcome.accepted(),
            rejected: outcome.rejected,
            checkpoint: Checkpoint::new(sequence.to_string()),
        })
    }
}

/// Parses a checkpoint issued by this server.
fn parse_checkpoint(checkpoint: &Checkpoint) -> ServerResult<u64> {
    if checkpoint.is_initial() {
        return Ok(0);
    }
    checkpoint
        .as_str()
        .parse()
        .map_err(|_| ServerError::InvalidCheckpoint(checkpoint.as_str().to_string()))
}
