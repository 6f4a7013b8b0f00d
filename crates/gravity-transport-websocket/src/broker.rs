use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::{SinkExt, StreamExt};
use gravity_codec::frame::{decode_frame_cbor, encode_frame_cbor, BusFrame};
use gravity_core::subject::subject_matches;
use gravity_core::BusMessage;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::WebSocketBusError;

#[derive(Debug, Clone)]
pub struct WebSocketBrokerConfig {
    pub listen_addr: String,
    /// Outbound frames buffered per connection before deliveries are dropped.
    pub connection_queue_capacity: usize,
}

impl WebSocketBrokerConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            connection_queue_capacity: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerMetrics {
    pub connections_total: u64,
    pub connections_active: u64,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

struct Connection {
    tx: mpsc::Sender<Vec<u8>>,
    subscriptions: HashMap<u64, String>,
}

#[derive(Default)]
struct BrokerState {
    connections: Mutex<HashMap<u64, Connection>>,
    next_conn_id: AtomicU64,
    connections_total: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BrokerState {
    fn connections(&self) -> MutexGuard<'_, HashMap<u64, Connection>> {
        match self.connections.lock() {
            Ok(conns) => conns,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn register(&self, tx: mpsc::Sender<Vec<u8>>) -> u64 {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections().insert(
            conn_id,
            Connection {
                tx,
                subscriptions: HashMap::new(),
            },
        );
        conn_id
    }

    fn unregister(&self, conn_id: u64) {
        self.connections().remove(&conn_id);
    }

    fn handle_frame(&self, conn_id: u64, bytes: &[u8]) {
        let frame = match decode_frame_cbor(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn_id, "dropping undecodable client frame: {err}");
                return;
            }
        };
        match frame {
            BusFrame::Subscribe { sid, pattern } => {
                if let Some(conn) = self.connections().get_mut(&conn_id) {
                    debug!(conn_id, sid, %pattern, "subscribe");
                    conn.subscriptions.insert(sid, pattern);
                }
            }
            BusFrame::Unsubscribe { sid } => {
                if let Some(conn) = self.connections().get_mut(&conn_id) {
                    debug!(conn_id, sid, "unsubscribe");
                    conn.subscriptions.remove(&sid);
                }
            }
            BusFrame::Publish { message } => self.fan_out(message),
            BusFrame::Deliver { .. } => {
                warn!(conn_id, "client sent a deliver frame; ignoring");
            }
        }
    }

    fn fan_out(&self, message: BusMessage) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let conns = self.connections();
        for conn in conns.values() {
            for (sid, pattern) in &conn.subscriptions {
                if !subject_matches(pattern, &message.subject) {
                    continue;
                }
                let frame = match encode_frame_cbor(&BusFrame::Deliver {
                    sid: *sid,
                    message: message.clone(),
                }) {
                    Ok(frame) => frame,
                    Err(err) => {
                        warn!("failed to encode deliver frame: {err}");
                        continue;
                    }
                };
                if conn.tx.try_send(frame).is_ok() {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

/// Subject-routing WebSocket broker.
///
/// Each connection owns its subscriptions; they disappear with it.
pub struct WebSocketBroker {
    listener: TcpListener,
    state: Arc<BrokerState>,
    config: WebSocketBrokerConfig,
}

impl WebSocketBroker {
    pub async fn bind(config: WebSocketBrokerConfig) -> Result<Self, WebSocketBusError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|e| WebSocketBusError::BindFailed(format!("{}: {e}", config.listen_addr)))?;
        Ok(Self {
            listener,
            state: Arc::new(BrokerState::default()),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, WebSocketBusError> {
        self.listener
            .local_addr()
            .map_err(|e| WebSocketBusError::BindFailed(e.to_string()))
    }

    pub fn metrics(&self) -> BrokerMetrics {
        BrokerMetrics {
            connections_total: self.state.connections_total.load(Ordering::Relaxed),
            connections_active: self.state.connections().len() as u64,
            published: self.state.published.load(Ordering::Relaxed),
            delivered: self.state.delivered.load(Ordering::Relaxed),
            dropped: self.state.dropped.load(Ordering::Relaxed),
        }
    }

    /// Accepts connections until `shutdown` resolves, then closes every
    /// connection.
    pub async fn serve(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::pin!(shutdown);
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "bus broker listening");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(serve_connection(
                                Arc::clone(&self.state),
                                stream,
                                peer,
                                self.config.connection_queue_capacity.max(1),
                                stop_rx.clone(),
                            ));
                        }
                        Err(err) => warn!("accept failed: {err}"),
                    }
                }
            }
        }

        let _ = stop_tx.send(true);
        let metrics = self.metrics();
        info!(
            published = metrics.published,
            delivered = metrics.delivered,
            dropped = metrics.dropped,
            "bus broker stopped"
        );
    }
}

async fn serve_connection(
    state: Arc<BrokerState>,
    stream: TcpStream,
    peer: SocketAddr,
    capacity: usize,
    mut stop_rx: watch::Receiver<bool>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, "websocket handshake failed: {err}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(capacity);
    let conn_id = state.register(tx);
    debug!(%peer, conn_id, "bus client connected");

    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                let _ = write.close().await;
                break;
            }
            maybe_in = read.next() => {
                match maybe_in {
                    Some(Ok(Message::Binary(bytes))) => state.handle_frame(conn_id, &bytes),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            maybe_out = rx.recv() => {
                match maybe_out {
                    Some(bytes) => {
                        if write.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.unregister(conn_id);
    debug!(%peer, conn_id, "bus client disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use gravity_bus::Bus;
    use gravity_core::BusMessage;
    use tokio::sync::oneshot;

    use super::{WebSocketBroker, WebSocketBrokerConfig};
    use crate::{WebSocketBus, WebSocketBusConfig, WebSocketBusError};

    async fn start_broker() -> (String, Arc<WebSocketBroker>, oneshot::Sender<()>) {
        let broker = WebSocketBroker::bind(WebSocketBrokerConfig::new("127.0.0.1:0"))
            .await
            .expect("broker should bind");
        let addr = broker.local_addr().expect("local addr");
        let broker = Arc::new(broker);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(Arc::clone(&broker).serve(async move {
            let _ = stop_rx.await;
        }));
        (format!("ws://{addr}"), broker, stop_tx)
    }

    async fn wait_for_subscriptions(broker: &WebSocketBroker, bus: &WebSocketBus, probe: &str) {
        // A subscribe frame is only visible to the broker once it has been
        // flushed; a probe round-trip proves the path is live.
        let mut sub = bus.subscribe(probe).expect("probe subscribe");
        for _ in 0..50 {
            bus.publish(BusMessage::new(probe, Vec::new()))
                .expect("probe publish");
            if tokio::time::timeout(Duration::from_millis(50), sub.next())
                .await
                .is_ok()
            {
                return;
            }
        }
        panic!("broker never routed probe; metrics: {:?}", broker.metrics());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_reaches_subscriber_on_another_connection() {
        let (url, broker, _stop) = start_broker().await;
        let subscriber = WebSocketBus::connect(WebSocketBusConfig::new(url.clone()))
            .await
            .expect("subscriber connects");
        let publisher = WebSocketBus::connect(WebSocketBusConfig::new(url))
            .await
            .expect("publisher connects");

        let mut sub = subscriber.subscribe("*").expect("subscribe");
        wait_for_subscriptions(&broker, &subscriber, "probe-sub").await;

        publisher
            .publish(
                BusMessage::new("user-1", b"hello".to_vec()).with_reply_to("_INBOX.abcd"),
            )
            .expect("publish");

        let got = loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), sub.next())
                .await
                .expect("delivery before timeout")
                .expect("subscription open");
            if msg.subject == "user-1" {
                break msg;
            }
        };
        assert_eq!(got.payload.as_ref(), b"hello");
        assert_eq!(got.reply_to.as_deref(), Some("_INBOX.abcd"));
        assert!(broker.metrics().connections_active >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn released_subscription_stops_receiving() {
        let (url, broker, _stop) = start_broker().await;
        let bus = WebSocketBus::connect(WebSocketBusConfig::new(url))
            .await
            .expect("connects");

        let sub = bus.subscribe("gone").expect("subscribe");
        wait_for_subscriptions(&broker, &bus, "probe-gone").await;
        drop(sub);
        assert_eq!(bus.health_snapshot().active_subscriptions, 0);

        bus.publish(BusMessage::new("gone", Vec::new())).expect("publish");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let health = bus.health_snapshot();
        assert_eq!(health.dropped, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_to_missing_broker_fails() {
        let mut config = WebSocketBusConfig::new("ws://127.0.0.1:1");
        config.connect_timeout = Duration::from_millis(500);
        let err = WebSocketBus::connect(config)
            .await
            .err()
            .expect("connect should fail");
        assert!(matches!(err, WebSocketBusError::Connect { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn publish_after_broker_shutdown_reports_not_connected() {
        let (url, _broker, stop) = start_broker().await;
        let mut config = WebSocketBusConfig::new(url);
        config.reconnect = false;
        let bus = WebSocketBus::connect(config).await.expect("connects");

        let _ = stop.send(());
        for _ in 0..50 {
            if !bus.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(matches!(
            bus.publish(BusMessage::new("k", Vec::new())),
            Err(WebSocketBusError::NotConnected)
        ));
    }
}
