//! Per-connection state and the read/write pumps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::game::GameCommand;
use crate::hub::HubEvent;
use shared::decode_frame;

/// Outbound queue depth per connection. The queue only decouples the hub
/// from the write pump; a consumer that has not drained the previous frame
/// is already behind and gets evicted rather than buffered.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1;

// Time allowed for a single write to the peer.
const WRITE_WAIT: Duration = Duration::from_secs(10);

// Window in which some inbound traffic (a pong counts) must arrive.
const READ_WAIT: Duration = Duration::from_secs(10);

/// Deadlines governing a connection's pumps. The ping period must stay
/// strictly below the read deadline so a healthy peer always has a probe
/// to answer before its deadline elapses.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub read_wait: Duration,
    pub write_wait: Duration,
    pub ping_period: Duration,
}

impl ConnectionConfig {
    pub fn with_read_wait(read_wait: Duration) -> Self {
        Self {
            read_wait,
            write_wait: WRITE_WAIT,
            ping_period: read_wait * 9 / 20,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::with_read_wait(READ_WAIT)
    }
}

/// The hub's handle to one registered connection. Dropping it closes the
/// outbound queue, which the write pump treats as its shutdown signal.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u32,
    outbound: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    pub fn new(id: u32, outbound: mpsc::Sender<Message>) -> Self {
        Self { id, outbound }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Non-blocking enqueue. Returns false when the queue is full (the
    /// peer is not keeping up) or already closed; the caller decides the
    /// connection's fate, never waits.
    pub fn enqueue_outbound(&self, msg: Message) -> bool {
        self.outbound.try_send(msg).is_ok()
    }
}

// State shared by both pumps of one connection.
struct Connection {
    id: u32,
    hub_tx: mpsc::Sender<HubEvent>,
    closed: AtomicBool,
}

impl Connection {
    // Idempotent: whichever pump (or caller) gets here first emits the one
    // Leave event; later calls are no-ops.
    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.hub_tx.send(HubEvent::Leave { id: self.id }).await;
        }
    }
}

/// Spawns the two pump tasks for an accepted connection. Each pump signals
/// the hub at most once on failure and then terminates; the hub's Leave
/// handling is idempotent either way.
pub fn spawn_pumps<S>(
    ws: WebSocketStream<S>,
    id: u32,
    config: ConnectionConfig,
    hub_tx: mpsc::Sender<HubEvent>,
    game_tx: mpsc::Sender<GameCommand>,
    outbound_rx: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, stream) = ws.split();
    let conn = Arc::new(Connection {
        id,
        hub_tx,
        closed: AtomicBool::new(false),
    });

    tokio::spawn(read_pump(stream, Arc::clone(&conn), config, game_tx));
    tokio::spawn(write_pump(sink, Arc::clone(&conn), config, outbound_rx));
}

/// Blocks on the peer's messages, deframes binary payloads and forwards
/// them as player input. Any transport error, framing error, peer close or
/// liveness expiry ends the pump and signals the hub.
async fn read_pump<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    conn: Arc<Connection>,
    config: ConnectionConfig,
    game_tx: mpsc::Sender<GameCommand>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        // Re-armed on every message, so any inbound traffic (pongs
        // included) refreshes the liveness deadline.
        let msg = match timeout(config.read_wait, stream.next()).await {
            Err(_) => {
                debug!("Client {}: no traffic within liveness deadline", conn.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Client {}: read error: {}", conn.id, e);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Binary(data) => {
                let payload = match decode_frame(&mut data.as_slice()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Client {}: bad frame: {}", conn.id, e);
                        break;
                    }
                };

                // The payload itself is the input handler's problem; a
                // frame that deframes cleanly but fails to parse is not
                // connection-fatal.
                match bincode::deserialize::<shared::ClientInput>(&payload) {
                    Ok(input) => {
                        let _ = game_tx.try_send(GameCommand::PlayerInput {
                            id: conn.id,
                            input,
                        });
                    }
                    Err(e) => warn!("Client {}: unreadable input payload: {}", conn.id, e),
                }
            }
            Message::Close(_) => break,
            // Pings are answered by the protocol layer; pongs and the rest
            // matter only as liveness traffic.
            _ => {}
        }
    }

    conn.close().await;
}

/// Drains the outbound queue onto the wire and emits liveness probes.
/// A closed queue means the hub evicted this connection: say goodbye with
/// a close frame and stop.
async fn write_pump<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    conn: Arc<Connection>,
    config: ConnectionConfig,
    mut outbound_rx: mpsc::Receiver<Message>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut pings = interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            queued = outbound_rx.recv() => {
                match queued {
                    Some(msg) => {
                        match timeout(config.write_wait, sink.send(msg)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                debug!("Client {}: write error: {}", conn.id, e);
                                break;
                            }
                            Err(_) => {
                                debug!("Client {}: write deadline exceeded", conn.id);
                                break;
                            }
                        }
                    }
                    None => {
                        let _ = timeout(config.write_wait, sink.send(Message::Close(None))).await;
                        break;
                    }
                }
            }
            _ = pings.tick() => {
                match timeout(config.write_wait, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Client {}: ping failed: {}", conn.id, e);
                        break;
                    }
                    Err(_) => {
                        debug!("Client {}: ping deadline exceeded", conn.id);
                        break;
                    }
                }
            }
        }
    }

    conn.close().await;
}
