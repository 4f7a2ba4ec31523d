//! Mock transport for testing.
//!
//! Drives the core without a backend: scripted push events, failure
//! injection for the connect path, latency simulation, and a full record
//! of every request sent; the tests assert "zero network calls" against
//! that record.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::transport::{PushEvent, Request, Response, Transport};

/// A scriptable in-memory [`Transport`].
pub struct MockTransport {
    live: AtomicBool,
    connect_calls: AtomicU32,
    remaining_connect_failures: AtomicU32,
    always_fail_connect: AtomicBool,
    connect_latency_ms: AtomicU64,
    fail_requests: AtomicBool,
    reject_next: Mutex<Option<String>>,
    requests: Mutex<Vec<Request>>,
    push_tx: broadcast::Sender<PushEvent>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock that connects successfully and queues every request.
    pub fn new() -> Self {
        let (push_tx, _) = broadcast::channel(64);
        Self {
            live: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            remaining_connect_failures: AtomicU32::new(0),
            always_fail_connect: AtomicBool::new(false),
            connect_latency_ms: AtomicU64::new(0),
            fail_requests: AtomicBool::new(false),
            reject_next: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            push_tx,
        }
    }

    /// Fail the next `count` connect attempts, then succeed.
    pub fn fail_connect_times(&self, count: u32) {
        self.remaining_connect_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every connect attempt until cleared.
    pub fn set_always_fail_connect(&self, fail: bool) {
        self.always_fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Simulate a slow handshake.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Fail every request until cleared.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Reject (rather than queue) the next request with the given reason.
    pub fn reject_next_request(&self, reason: impl Into<String>) {
        *self.reject_next.lock().expect("mock lock poisoned") = Some(reason.into());
    }

    /// Deliver a push event to all subscribers.
    pub fn push(&self, event: PushEvent) {
        // Ignore error if the pump has not subscribed yet
        let _ = self.push_tx.send(event);
    }

    /// Simulate a server-initiated disconnect.
    pub fn drop_connection(&self, reason: impl Into<String>) {
        self.live.store(false, Ordering::SeqCst);
        self.push(PushEvent::ConnectionLost {
            reason: reason.into(),
        });
    }

    /// Number of connect attempts made against this transport.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().expect("mock lock poisoned").clone()
    }

    /// Number of requests sent so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_connect_failures.load(Ordering::SeqCst) > 0 {
            self.remaining_connect_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::transport("mock handshake failure"));
        }
        if self.always_fail_connect.load(Ordering::SeqCst) {
            return Err(Error::transport("mock handshake failure"));
        }

        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.live.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    async fn request(&self, request: Request) -> Result<Response> {
        self.requests
            .lock()
            .expect("mock lock poisoned")
            .push(request);

        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(Error::transport("mock request failure"));
        }
        if let Some(reason) = self.reject_next.lock().expect("mock lock poisoned").take() {
            return Ok(Response::Rejected { reason });
        }
        Ok(Response::Queued)
    }

    fn events(&self) -> broadcast::Receiver<PushEvent> {
        self.push_tx.subscribe()
    }
}
