use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use cloudclip::websockets::{OutboundEvent, OutboundSink, SocketError};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Outbound sink that records every frame and can be switched to failing
pub struct MockSink {
    frames: RwLock<VecDeque<String>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
    fail_after: AtomicUsize,
    closed: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            frames: RwLock::new(VecDeque::new()),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            fail_after: AtomicUsize::new(usize::MAX),
            closed: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let sink = Self::new();
        sink.set_failing(true);
        sink
    }

    /// Makes every following write fail, like a client that went away
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepts writes until `attempts` have been made, then fails every following one
    pub fn fail_after(&self, attempts: usize) {
        self.fail_after.store(attempts, Ordering::SeqCst);
    }

    /// Number of writes attempted, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Removes and returns every recorded frame, parsed
    pub async fn take_events(&self) -> Vec<OutboundEvent> {
        self.frames
            .write()
            .await
            .drain(..)
            .map(|frame| serde_json::from_str(&frame).unwrap())
            .collect()
    }

    pub async fn clear(&self) {
        self.frames.write().await.clear();
    }
}

#[async_trait]
impl OutboundSink for MockSink {
    async fn send_text(&self, frame: String) -> Result<(), SocketError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.closed.load(Ordering::SeqCst) {
            return Err(SocketError::ConnectionClosed);
        }
        if self.failing.load(Ordering::SeqCst) || attempt > self.fail_after.load(Ordering::SeqCst) {
            return Err(SocketError::SendFailed("connection reset".to_string()));
        }
        self.frames.write().await.push_back(frame);
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
