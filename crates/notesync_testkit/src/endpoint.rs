//! In-process access to the reference server.

use notesync_engine::{HttpResponse, LoopbackServer};
use notesync_server::SyncServer;
use std::sync::Arc;

/// Exposes a [`SyncServer`] to a [`notesync_engine::LoopbackClient`].
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    server: Arc<SyncServer>,
}

impl ServerEndpoint {
    /// Wraps a shared server.
    pub fn new(server: Arc<SyncServer>) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<SyncServer> {
        &self.server
    }
}

impl LoopbackServer for ServerEndpoint {
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse {
        let reply = self.server.handle_post(path, body);
        HttpResponse {
            status: reply.status,
            body: reply.body,
        }
    }
}
