//! Server network layer: accepting peers and wiring up their pumps

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;

use crate::connection::{self, ConnectionConfig, ConnectionHandle, OUTBOUND_QUEUE_CAPACITY};
use crate::game::GameCommand;
use crate::hub::HubEvent;

/// Accepts TCP connections and upgrades each to a WebSocket peer
pub struct NetworkServer {
    listener: TcpListener,
    config: ConnectionConfig,
    next_id: AtomicU32,
}

impl NetworkServer {
    pub async fn bind(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            config: ConnectionConfig::default(),
            next_id: AtomicU32::new(0),
        })
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop. Failure to accept is process-fatal and
    /// surfaces to the caller; everything after the accept happens on the
    /// new peer's own task so a slow handshake never stalls the listener.
    pub async fn run(
        self,
        hub_tx: mpsc::Sender<HubEvent>,
        game_tx: mpsc::Sender<GameCommand>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        loop {
            let (stream, peer_addr) = self.listener.accept().await?;

            // Ids are unique for the process lifetime, never reused
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let config = self.config;
            let hub_tx = hub_tx.clone();
            let game_tx = game_tx.clone();

            tokio::spawn(async move {
                handle_peer(stream, peer_addr, id, config, hub_tx, game_tx).await;
            });
        }
    }
}

async fn handle_peer(
    stream: TcpStream,
    peer_addr: SocketAddr,
    id: u32,
    config: ConnectionConfig,
    hub_tx: mpsc::Sender<HubEvent>,
    game_tx: mpsc::Sender<GameCommand>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket upgrade failed for {}: {}", peer_addr, e);
            return;
        }
    };

    debug!("Client {} connected from {}", id, peer_addr);

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let handle = ConnectionHandle::new(id, out_tx);

    // Spawn the player before the hub learns about the connection, so the
    // first broadcast after the join already carries its entity
    if game_tx.send(GameCommand::AddPlayer { id }).await.is_err() {
        return;
    }
    if hub_tx.send(HubEvent::Join { handle }).await.is_err() {
        return;
    }

    connection::spawn_pumps(ws, id, config, hub_tx, game_tx, out_rx);
}
