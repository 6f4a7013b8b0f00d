use std::fmt;

use gravity_core::subject;
use gravity_core::BusMessage;
use tokio::sync::mpsc;

/// Coarse per-bus health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusHealthSnapshot {
    pub published: u64,
    pub publish_err: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub active_subscriptions: u64,
    pub reconnect_attempts: u64,
    pub last_error: Option<String>,
}

/// Publish/subscribe contract used by cache nodes and clients.
///
/// Delivery is at-least-once with no ordering guarantee across subscribers.
/// Subjects are `.`-separated tokens; patterns may use `*` (one token) and
/// `>` (one or more trailing tokens).
pub trait Bus: Send + Sync {
    /// Transport-specific error.
    type Error: fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Hands one message to the bus for fan-out to every matching subscription.
    fn publish(&self, message: BusMessage) -> Result<(), Self::Error>;

    /// Registers interest in `pattern`. Dropping the returned handle releases it.
    fn subscribe(&self, pattern: &str) -> Result<Subscription, Self::Error>;

    /// Returns a fresh single-use reply subject.
    fn new_inbox(&self) -> String {
        subject::new_inbox()
    }

    /// Best-effort health counters.
    fn health_snapshot(&self) -> BusHealthSnapshot {
        BusHealthSnapshot::default()
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Receiving side of one subscription.
///
/// The subscription is released when the handle is dropped, so a reply inbox
/// stops receiving as soon as its owner goes away.
pub struct Subscription {
    sid: u64,
    pattern: String,
    rx: mpsc::Receiver<BusMessage>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        sid: u64,
        pattern: impl Into<String>,
        rx: mpsc::Receiver<BusMessage>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            sid,
            pattern: pattern.into(),
            rx,
            release: Some(Box::new(release)),
        }
    }

    pub fn sid(&self) -> u64 {
        self.sid
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Waits for the next message. `None` once the bus side has gone away.
    pub async fn next(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Returns an already-queued message without waiting.
    pub fn try_next(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }

    /// Releases the subscription now.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        self.rx.close();
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("sid", &self.sid)
            .field("pattern", &self.pattern)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}
