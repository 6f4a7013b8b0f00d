use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gravity_bus::{Bus, BusHealthSnapshot, Subscription};
use gravity_codec::frame::{decode_frame_cbor, encode_frame_cbor, BusFrame};
use gravity_core::subject::validate_pattern;
use gravity_core::BusMessage;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::WebSocketBusError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct WebSocketBusConfig {
    pub url: String,
    pub reconnect: bool,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
    pub connect_timeout: Duration,
    pub outbound_queue_capacity: usize,
    pub subscription_queue_capacity: usize,
}

impl WebSocketBusConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: true,
            reconnect_initial: Duration::from_millis(250),
            reconnect_max: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            outbound_queue_capacity: 1024,
            subscription_queue_capacity: 4096,
        }
    }
}

struct ClientSubscription {
    pattern: String,
    tx: mpsc::Sender<BusMessage>,
}

#[derive(Default)]
struct Shared {
    subscriptions: Mutex<HashMap<u64, ClientSubscription>>,
    next_sid: AtomicU64,
    connected: AtomicBool,
    published: AtomicU64,
    publish_err: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    reconnect_attempts: AtomicU64,
}

impl Shared {
    fn subscriptions(&self) -> MutexGuard<'_, HashMap<u64, ClientSubscription>> {
        match self.subscriptions.lock() {
            Ok(subs) => subs,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn resubscribe_frames(&self) -> Vec<Vec<u8>> {
        self.subscriptions()
            .iter()
            .filter_map(|(sid, sub)| {
                encode_frame_cbor(&BusFrame::Subscribe {
                    sid: *sid,
                    pattern: sub.pattern.clone(),
                })
                .ok()
            })
            .collect()
    }

    fn route_inbound(&self, bytes: &[u8]) {
        let (sid, message) = match decode_frame_cbor(bytes) {
            Ok(BusFrame::Deliver { sid, message }) => (sid, message),
            Ok(other) => {
                debug!(?other, "ignoring non-deliver frame from broker");
                return;
            }
            Err(err) => {
                warn!("dropping undecodable broker frame: {err}");
                return;
            }
        };
        let subs = self.subscriptions();
        // Late deliveries for released subscriptions are discarded here.
        let Some(sub) = subs.get(&sid) else {
            return;
        };
        if sub.tx.try_send(message).is_ok() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn close_all(&self) {
        self.subscriptions().clear();
    }
}

/// Client connection to a `WebSocketBroker`.
pub struct WebSocketBus {
    shared: Arc<Shared>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    subscription_queue_capacity: usize,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl WebSocketBus {
    /// Connects to the broker at `config.url`. Fails if the first connection
    /// cannot be established within `connect_timeout`.
    pub async fn connect(config: WebSocketBusConfig) -> Result<Self, WebSocketBusError> {
        let stream = dial(&config)
            .await
            .map_err(|reason| WebSocketBusError::Connect {
                url: config.url.clone(),
                reason,
            })?;
        info!(url = %config.url, "connected to bus broker");

        let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(config.outbound_queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::Relaxed);

        let worker = tokio::spawn(run_client_worker(
            config.clone(),
            Arc::clone(&shared),
            stream,
            outbound_rx,
            shutdown_rx,
        ));

        Ok(Self {
            shared,
            outbound_tx,
            subscription_queue_capacity: config.subscription_queue_capacity.max(1),
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// Stops the connection worker and waits for it to exit.
    pub async fn close(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    fn enqueue(&self, bytes: Vec<u8>) -> Result<(), WebSocketBusError> {
        self.outbound_tx.try_send(bytes).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => WebSocketBusError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => WebSocketBusError::Closed,
        })
    }
}

impl Drop for WebSocketBus {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Bus for WebSocketBus {
    type Error = WebSocketBusError;

    fn publish(&self, message: BusMessage) -> Result<(), Self::Error> {
        if !self.is_connected() {
            self.shared.publish_err.fetch_add(1, Ordering::Relaxed);
            return Err(WebSocketBusError::NotConnected);
        }
        let result = encode_frame_cbor(&BusFrame::Publish { message })
            .map_err(WebSocketBusError::from)
            .and_then(|frame| self.enqueue(frame));
        match &result {
            Ok(()) => self.shared.published.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.shared.publish_err.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn subscribe(&self, pattern: &str) -> Result<Subscription, Self::Error> {
        if !self.is_connected() {
            return Err(WebSocketBusError::NotConnected);
        }
        validate_pattern(pattern)?;
        let sid = self.shared.next_sid.fetch_add(1, Ordering::Relaxed) + 1;
        let frame = encode_frame_cbor(&BusFrame::Subscribe {
            sid,
            pattern: pattern.to_string(),
        })?;

        let (tx, rx) = mpsc::channel(self.subscription_queue_capacity);
        self.shared.subscriptions().insert(
            sid,
            ClientSubscription {
                pattern: pattern.to_string(),
                tx,
            },
        );
        if let Err(err) = self.enqueue(frame) {
            self.shared.subscriptions().remove(&sid);
            return Err(err);
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let outbound_tx = self.outbound_tx.clone();
        Ok(Subscription::new(sid, pattern, rx, move || {
            if let Some(shared) = weak.upgrade() {
                shared.subscriptions().remove(&sid);
            }
            if let Ok(frame) = encode_frame_cbor(&BusFrame::Unsubscribe { sid }) {
                let _ = outbound_tx.try_send(frame);
            }
        }))
    }

    fn health_snapshot(&self) -> BusHealthSnapshot {
        BusHealthSnapshot {
            published: self.shared.published.load(Ordering::Relaxed),
            publish_err: self.shared.publish_err.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            active_subscriptions: self.shared.subscriptions().len() as u64,
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::Relaxed),
            last_error: None,
        }
    }
}

/// One connection attempt, bounded by `connect_timeout`.
async fn dial(config: &WebSocketBusConfig) -> Result<WsStream, String> {
    match tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str())).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err("timed out".to_string()),
    }
}

async fn run_client_worker(
    config: WebSocketBusConfig,
    shared: Arc<Shared>,
    initial: WsStream,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut next_stream = Some(initial);
    let mut backoff = config.reconnect_initial;
    let mut resubscribe = false;

    'outer: loop {
        let stream = match next_stream.take() {
            Some(stream) => stream,
            None => {
                shared.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
                let attempt = tokio::select! {
                    _ = &mut shutdown_rx => break 'outer,
                    attempt = dial(&config) => attempt,
                };
                match attempt {
                    Ok(stream) => {
                        info!(url = %config.url, "reconnected to bus broker");
                        stream
                    }
                    Err(err) => {
                        warn!(url = %config.url, "bus reconnect failed: {err}");
                        tokio::select! {
                            _ = &mut shutdown_rx => break 'outer,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        backoff = std::cmp::min(backoff.saturating_mul(2), config.reconnect_max);
                        continue;
                    }
                }
            }
        };
        backoff = config.reconnect_initial;
        let (mut write, mut read) = stream.split();

        if resubscribe {
            for frame in shared.resubscribe_frames() {
                if write.send(Message::Binary(frame)).await.is_err() {
                    continue 'outer;
                }
            }
        }
        resubscribe = true;
        shared.connected.store(true, Ordering::Relaxed);

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    let _ = write.close().await;
                    break 'outer;
                }
                maybe_out = outbound_rx.recv() => {
                    match maybe_out {
                        Some(bytes) => {
                            if write.send(Message::Binary(bytes)).await.is_err() {
                                shared.publish_err.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                        }
                        None => break 'outer,
                    }
                }
                maybe_in = read.next() => {
                    match maybe_in {
                        Some(Ok(Message::Binary(bytes))) => shared.route_inbound(&bytes),
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        shared.connected.store(false, Ordering::Relaxed);
        warn!(url = %config.url, "bus connection lost");
        if !config.reconnect {
            break 'outer;
        }
        tokio::select! {
            _ = &mut shutdown_rx => break 'outer,
            _ = tokio::time::sleep(backoff) => {}
        }
    }

    shared.connected.store(false, Ordering::Relaxed);
    shared.close_all();
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tokio::net::TcpListener;

    use super::{dial, WebSocketBusConfig};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dial_gives_up_on_a_silent_broker() {
        // Accepts TCP through the backlog but never answers the handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut config = WebSocketBusConfig::new(format!("ws://{addr}"));
        config.connect_timeout = Duration::from_millis(100);

        let started = Instant::now();
        let err = dial(&config).await.err().expect("handshake never completes");
        assert_eq!(err, "timed out");
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }
}
