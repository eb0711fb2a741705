//! Sync server implementation.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{DeviceSession, HandlerContext, RequestHandler};
use crate::oplog::ServerOplog;
use notesync_protocol::{
    DeviceId, EntityId, EntityPayload, EntityType, PullRequest, PullResponse, PushRequest,
    PushResponse, WireMessage,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Path of the push endpoint.
pub const PUSH_ENDPOINT: &str = "/sync/push";
/// Path of the pull endpoint.
pub const PULL_ENDPOINT: &str = "/sync/pull";

/// Raw reply to an HTTP-style request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Status code.
    pub status: u16,
    /// JSON body on success, plain-text message on error.
    pub body: Vec<u8>,
}

impl Reply {
    fn from_error(err: &ServerError) -> Self {
        Self {
            status: err.status_code(),
            body: err.to_string().into_bytes(),
        }
    }
}

/// The sync server.
///
/// This is the main entry point for the sync server. It handles
/// incoming sync requests and manages the server-side oplog.
///
/// # Example
///
/// ```rust
/// use notesync_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
/// let reply = server.handle_post("/sync/pull", br#"{"checkpoint":""}"#);
/// assert_eq!(reply.status, 200);
/// ```
#[derive(Debug)]
pub struct SyncServer {
    handler: RequestHandler,
    oplog: Arc<ServerOplog>,
}

impl SyncServer {
    /// Creates a new sync server.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_oplog(config, Arc::new(ServerOplog::new()))
    }

    /// Creates a sync server with an existing oplog.
    pub fn with_oplog(config: ServerConfig, oplog: Arc<ServerOplog>) -> Self {
        let context = Arc::new(HandlerContext::new(config, Arc::clone(&oplog)));
        let handler = RequestHandler::new(context);
        Self { handler, oplog }
    }

    /// Handles a pull request.
    pub fn handle_pull(&self, request: PullRequest) -> ServerResult<PullResponse> {
        self.handler.handle_pull(request)
    }

    /// Handles a push request.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        self.handler.handle_push(request)
    }

    /// Handles a raw POST to one of the sync endpoints.
    ///
    /// Malformed bodies map to 400, oversized pushes to 413 and unknown
    /// paths to 404.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> Reply {
        match self.dispatch(path, body) {
            Ok(body) => Reply { status: 200, body },
            Err(err) => {
                warn!(path, status = err.status_code(), error = %err, "request failed");
                Reply::from_error(&err)
            }
        }
    }

    fn dispatch(&self, path: &str, body: &[u8]) -> ServerResult<Vec<u8>> {
        let encoded = match path {
            PUSH_ENDPOINT => self.handle_push(PushRequest::decode(body).map_err(invalid)?)?.encode(),
            PULL_ENDPOINT => self.handle_pull(PullRequest::decode(body).map_err(invalid)?)?.encode(),
            other => return Err(ServerError::NotFound(other.to_string())),
        };
        encoded.map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Returns the current server sequence.
    pub fn sequence(&self) -> u64 {
        self.oplog.sequence()
    }

    /// Returns the number of changes in the oplog.
    pub fn operation_count(&self) -> usize {
        self.oplog.len()
    }

    /// Returns the winning state of an entity.
    pub fn entity(&self, entity_type: EntityType, entity_id: EntityId) -> Option<EntityPayload> {
        self.oplog.entity(entity_type, entity_id)
    }

    /// Returns every live entity.
    pub fn live_entities(&self) -> BTreeMap<(EntityType, EntityId), EntityPayload> {
        self.oplog.live_entities()
    }

    /// Returns the session of a device, if it has pushed.
    pub fn session(&self, device_id: &DeviceId) -> Option<DeviceSession> {
        self.handler.context().session(device_id)
    }
}

fn invalid(err: notesync_protocol::ProtocolError) -> ServerError {
    ServerError::InvalidRequest(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use notesync_protocol::{Checkpoint, Delta};

    fn push_body(device: DeviceId, changes: Vec<Delta>) -> Vec<u8> {
        PushRequest::new(device, Checkpoint::initial(), changes)
            .encode()
            .unwrap()
    }

    #[test]
    fn server_creation() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.sequence(), 0);
        assert_eq!(server.operation_count(), 0);
    }

    #[test]
    fn post_push_and_pull() {
        let server = SyncServer::new(ServerConfig::default());
        let device = DeviceId::generate();
        let id = EntityId::new();
        let delta = Delta::create(id, EntityPayload::note("t", "b"), Utc::now(), device);

        let reply = server.handle_post(PUSH_ENDPOINT, &push_body(device, vec![delta.clone()]));
        assert_eq!(reply.status, 200);
        let pushed = PushResponse::decode(&reply.body).unwrap();
        assert_eq!(pushed.accepted, 1);

        let body = PullRequest::new(Checkpoint::initial(), None).encode().unwrap();
        let reply = server.handle_post(PULL_ENDPOINT, &body);
        assert_eq!(reply.status, 200);
        let pulled = PullResponse::decode(&reply.body).unwrap();
        assert_eq!(pulled.changes, vec![delta]);
        assert_eq!(server.entity(EntityType::Note, id), Some(EntityPayload::note("t", "b")));
        assert!(server.session(&device).is_some());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let server = SyncServer::new(ServerConfig::default());
        let reply = server.handle_post(PUSH_ENDPOINT, b"not json");
        assert_eq!(reply.status, 400);
        assert!(String::from_utf8(reply.body).unwrap().starts_with("invalid request"));
    }

    #[test]
    fn unknown_path_is_not_found() {
        let server = SyncServer::new(ServerConfig::default());
        assert_eq!(server.handle_post("/sync/nope", b"{}").status, 404);
    }

    #[test]
    fn oversized_push_is_413() {
        let server = SyncServer::new(ServerConfig::new().with_max_push_batch(1));
        let device = DeviceId::generate();
        let changes = (0..2)
            .map(|_| Delta::create(EntityId::new(), EntityPayload::note("t", ""), Utc::now(), device))
            .collect();
        assert_eq!(server.handle_post(PUSH_ENDPOINT, &push_body(device, changes)).status, 413);
    }

    #[test]
    fn shared_oplog() {
        let oplog = Arc::new(ServerOplog::new());
        let first = SyncServer::with_oplog(ServerConfig::default(), Arc::clone(&oplog));
        let second = SyncServer::with_oplog(ServerConfig::default(), oplog);
        let device = DeviceId::generate();

        first.handle_post(
            PUSH_ENDPOINT,
            &push_body(
                device,
                vec![Delta::create(EntityId::new(), EntityPayload::note("t", ""), Utc::now(), device)],
            ),
        );
        assert_eq!(second.sequence(), 1);
    }
}
