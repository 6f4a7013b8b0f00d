use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use gravity_core::subject::{subject_matches, validate_pattern, validate_subject};
use gravity_core::{BusMessage, GravityError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::bus::{Bus, BusHealthSnapshot, Subscription};

#[derive(Debug, Clone)]
pub struct InMemoryBusConfig {
    /// Per-subscription queue depth; messages beyond it are dropped.
    pub subscription_queue_capacity: usize,
}

impl Default for InMemoryBusConfig {
    fn default() -> Self {
        Self {
            subscription_queue_capacity: 4096,
        }
    }
}

#[derive(Debug, Error)]
pub enum InMemoryBusError {
    #[error("publish disabled")]
    PublishDisabled,
    #[error("subscribe disabled")]
    SubscribeDisabled,
    #[error(transparent)]
    InvalidSubject(#[from] GravityError),
}

struct SubscriptionEntry {
    pattern: String,
    tx: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
struct Inner {
    subscriptions: Mutex<HashMap<u64, SubscriptionEntry>>,
    next_sid: AtomicU64,
    block_publish: AtomicBool,
    block_subscribe: AtomicBool,
    extra_deliveries: AtomicU32,
    published: AtomicU64,
    publish_err: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Inner {
    fn release(&self, sid: u64) {
        if let Ok(mut subs) = self.subscriptions.lock() {
            subs.remove(&sid);
        }
    }
}

/// In-process bus for tests and simulations.
///
/// Clones share one subject space, so a cluster of nodes and clients can be
/// wired together by cloning the same bus into each of them.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Inner>,
    config: InMemoryBusConfig,
}

impl InMemoryBus {
    pub fn new(config: InMemoryBusConfig) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            config,
        }
    }

    /// If enabled, every publish fails (transport outage simulation).
    pub fn set_block_publish(&self, block: bool) {
        self.inner.block_publish.store(block, Ordering::Relaxed);
    }

    /// If enabled, every subscribe fails.
    pub fn set_block_subscribe(&self, block: bool) {
        self.inner.block_subscribe.store(block, Ordering::Relaxed);
    }

    /// Delivers every message `1 + extra` times (at-least-once redelivery
    /// simulation).
    pub fn set_extra_deliveries(&self, extra: u32) {
        self.inner.extra_deliveries.store(extra, Ordering::Relaxed);
    }

    pub fn subscription_count(&self) -> usize {
        self.inner
            .subscriptions
            .lock()
            .map(|subs| subs.len())
            .unwrap_or_default()
    }
}

impl Bus for InMemoryBus {
    type Error = InMemoryBusError;

    fn publish(&self, message: BusMessage) -> Result<(), Self::Error> {
        if self.inner.block_publish.load(Ordering::Relaxed) {
            self.inner.publish_err.fetch_add(1, Ordering::Relaxed);
            return Err(InMemoryBusError::PublishDisabled);
        }
        if let Err(err) = validate_subject(&message.subject) {
            self.inner.publish_err.fetch_add(1, Ordering::Relaxed);
            return Err(err.into());
        }
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let copies = 1 + self.inner.extra_deliveries.load(Ordering::Relaxed);
        let subs = match self.inner.subscriptions.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (sid, entry) in subs.iter() {
            if !subject_matches(&entry.pattern, &message.subject) {
                continue;
            }
            for _ in 0..copies {
                match entry.tx.try_send(message.clone()) {
                    Ok(()) => {
                        self.inner.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Full(_)) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(sid, subject = %message.subject, "subscription queue full, dropping");
                    }
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, Self::Error> {
        if self.inner.block_subscribe.load(Ordering::Relaxed) {
            return Err(InMemoryBusError::SubscribeDisabled);
        }
        validate_pattern(pattern)?;

        let sid = self.inner.next_sid.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.config.subscription_queue_capacity.max(1));
        {
            let mut subs = match self.inner.subscriptions.lock() {
                Ok(subs) => subs,
                Err(poisoned) => poisoned.into_inner(),
            };
            subs.insert(
                sid,
                SubscriptionEntry {
                    pattern: pattern.to_string(),
                    tx,
                },
            );
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(sid, pattern, rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.release(sid);
            }
        }))
    }

    fn health_snapshot(&self) -> BusHealthSnapshot {
        BusHealthSnapshot {
            published: self.inner.published.load(Ordering::Relaxed),
            publish_err: self.inner.publish_err.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            active_subscriptions: self.subscription_count() as u64,
            reconnect_attempts: 0,
            last_error: None,
        }
    }
}
