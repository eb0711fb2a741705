//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use notesync_protocol::{PullRequest, PullResponse, PushRequest, PushResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Network communication with the sync server.
///
/// Implementations perform exactly one request per call; retrying is the
/// caller's job.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Submits a batch of local deltas.
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Fetches remote changes after a checkpoint.
    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Returns false when the device is known to be offline.
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        (**self).push(request).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        (**self).pull(request).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A scripted transport for testing.
///
/// Queued results are returned in order. Once a queue is empty, push
/// accepts every change and pull returns an empty batch at the requested
/// checkpoint.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    latency: Mutex<Duration>,
    push_results: Mutex<VecDeque<SyncResult<PushResponse>>>,
    pull_results: Mutex<VecDeque<SyncResult<PullResponse>>>,
    push_requests: Mutex<Vec<PushRequest>>,
    pull_requests: Mutex<Vec<PullRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Queues the result of a future push.
    pub fn queue_push(&self, result: SyncResult<PushResponse>) {
        self.push_results.lock().push_back(result);
    }

    /// Queues the result of a future pull.
    pub fn queue_pull(&self, result: SyncResult<PullResponse>) {
        self.pull_results.lock().push_back(result);
    }

    /// Push requests received so far.
    pub fn push_requests(&self) -> Vec<PushRequest> {
        self.push_requests.lock().clone()
    }

    /// Pull requests received so far.
    pub fn pull_requests(&self) -> Vec<PullRequest> {
        self.pull_requests.lock().clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.push_requests.lock().push(request.clone());
        self.simulate_latency().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let scripted = self.push_results.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(PushResponse::accepted(
                request.changes.len() as u32,
                request.checkpoint.clone(),
            ))
        })
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pull_requests.lock().push(request.clone());
        self.simulate_latency().await;
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let scripted = self.pull_results.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(PullResponse::empty(request.checkpoint.clone())))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_protocol::{Checkpoint, DeviceId};

    #[test]
    fn mock_transport_connection() {
        let transport = MockTransport::new();
        assert!(transport.is_connected());
        transport.set_connected(false);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn mock_transport_not_connected_error() {
        let transport = MockTransport::new();
        transport.set_connected(false);

        let request = PullRequest::new(Checkpoint::initial(), None);
        let result = transport.pull(&request).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert_eq!(transport.pull_requests().len(), 1);
    }

    #[tokio::test]
    async fn scripted_then_default() {
        let transport = MockTransport::new();
        transport.queue_push(Err(SyncError::http(503, "busy")));

        let request = PushRequest::new(DeviceId::generate(), Checkpoint::new("4"), Vec::new());
        assert!(transport.push(&request).await.is_err());

        let response = transport.push(&request).await.unwrap();
        assert_eq!(response.accepted, 0);
        assert_eq!(response.checkpoint, Checkpoint::new("4"));
        assert_eq!(transport.push_requests().len(), 2);
    }
}
