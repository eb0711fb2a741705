//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so the engine
//! does not depend on a particular HTTP library. Bodies are JSON.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use async_trait::async_trait;
use notesync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse, WireMessage};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Path of the push endpoint.
pub const PUSH_PATH: &str = "/sync/push";
/// Path of the pull endpoint.
pub const PULL_PATH: &str = "/sync/pull";

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// An error response with a plain-text body.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: message.into().into_bytes(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// `post` returns `Err` only when no response was received at all; any
/// response, whatever its status, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client believes the network is reachable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based sync transport.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the sync server (e.g., "https://sync.example.com").
    base_url: String,
    client: C,
    online: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            online: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Records host connectivity as reported by the platform.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn post_json<Req, Res>(&self, path: &str, request: &Req) -> SyncResult<Res>
    where
        Req: WireMessage + Sync,
        Res: WireMessage,
    {
        let body = request.encode()?;
        let url = format!("{}{}", self.base_url, path);

        let response = match self.client.post(&url, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "request failed");
                *self.last_error.write() = Some(e.clone());
                return Err(SyncError::Transport(e));
            }
        };

        if !response.is_success() {
            let message = String::from_utf8_lossy(&response.body).into_owned();
            debug!(url = %url, status = response.status, message = %message, "request rejected");
            *self.last_error.write() = Some(format!("HTTP {}: {}", response.status, message));
            return Err(SyncError::http(response.status, message));
        }

        *self.last_error.write() = None;
        Ok(Res::decode(&response.body)?)
    }
}

#[async_trait]
impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.post_json(PUSH_PATH, request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.post_json(PULL_PATH, request).await
    }

    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("online", &self.online.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Servers that can answer requests in-process.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST to `path`.
    fn handle_post(&self, path: &str, body: &[u8]) -> HttpResponse;
}

/// An HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let path = url.find("/sync/").map_or(url, |i| &url[i..]);
        Ok(self.server.handle_post(path, &body))
    }
}
