//! Fault injection for the HTTP layer.

use async_trait::async_trait;
use notesync_engine::{HttpClient, HttpResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// A failure injected in place of a real response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// No response at all (connection reset, DNS failure).
    Network(String),
    /// A response with an error status and plain-text body.
    Status(u16, String),
}

impl Fault {
    /// A dropped connection.
    pub fn network() -> Self {
        Fault::Network("connection reset by peer".into())
    }

    /// A 503 from an overloaded server.
    pub fn unavailable() -> Self {
        Fault::Status(503, "service unavailable".into())
    }
}

/// Wraps an [`HttpClient`], failing requests on demand.
///
/// Faults are queued per endpoint suffix (`"/sync/push"`, `"/sync/pull"`)
/// and consumed one per matching request, before the request reaches the
/// inner client.
#[derive(Debug)]
pub struct FlakyClient<C> {
    inner: C,
    faults: Mutex<VecDeque<(String, Fault)>>,
    unhealthy: AtomicBool,
    requests: AtomicU64,
    injected: AtomicU64,
}

impl<C: HttpClient> FlakyClient<C> {
    /// Wraps a client with no faults queued.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            faults: Mutex::new(VecDeque::new()),
            unhealthy: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Fails the next `count` requests whose URL ends with `path`.
    pub fn fail_next(&self, path: &str, count: usize, fault: Fault) {
        let mut faults = self.faults.lock();
        for _ in 0..count {
            faults.push_back((path.to_string(), fault.clone()));
        }
    }

    /// Makes the client report the network as unreachable.
    pub fn set_unhealthy(&self, unhealthy: bool) {
        self.unhealthy.store(unhealthy, Ordering::SeqCst);
    }

    /// Requests seen, failed ones included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Faults delivered so far.
    pub fn injected_count(&self) -> u64 {
        self.injected.load(Ordering::SeqCst)
    }

    /// Faults still queued.
    pub fn pending_faults(&self) -> usize {
        self.faults.lock().len()
    }

    fn take_fault(&self, url: &str) -> Option<Fault> {
        let mut faults = self.faults.lock();
        let index = faults.iter().position(|(path, _)| url.ends_with(path.as_str()))?;
        faults.remove(index).map(|(_, fault)| fault)
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for FlakyClient<C> {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match self.take_fault(url) {
            Some(Fault::Network(message)) => {
                self.injected.fetch_add(1, Ordering::SeqCst);
                debug!(url, "injecting network fault");
                Err(message)
            }
            Some(Fault::Status(status, message)) => {
                self.injected.fetch_add(1, Ordering::SeqCst);
                debug!(url, status, "injecting status fault");
                Ok(HttpResponse::error(status, message))
            }
            None => self.inner.post(url, body).await,
        }
    }

    fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst) && self.inner.is_healthy()
    }
}
