//! Connection registry and broadcast fan-out
//!
//! The hub is the single owner of the set of live connections. Every other
//! task talks to it through one bounded event channel; nothing else reads
//! or mutates the registry. Events are processed strictly in arrival
//! order, and a congested peer is evicted inside the broadcast pass that
//! caught it, before the next event is dequeued.

use std::collections::HashMap;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::connection::ConnectionHandle;
use crate::game::GameCommand;

/// Depth of the hub's event channel. Bounded so the tick loop can hand off
/// frames without ever blocking on a busy hub; a full channel costs one
/// snapshot frame, which the next tick supersedes.
pub const HUB_QUEUE_CAPACITY: usize = 64;

/// Events consumed by the hub's event loop
#[derive(Debug)]
pub enum HubEvent {
    Join { handle: ConnectionHandle },
    Leave { id: u32 },
    Broadcast { frame: Vec<u8> },
}

/// Owner of connection membership and the snapshot broadcaster
pub struct Hub {
    connections: HashMap<u32, ConnectionHandle>,
    max_clients: usize,
    game_tx: mpsc::Sender<GameCommand>,
}

impl Hub {
    pub fn new(max_clients: usize, game_tx: mpsc::Sender<GameCommand>) -> Self {
        Self {
            connections: HashMap::new(),
            max_clients,
            game_tx,
        }
    }

    /// Number of currently registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Consumes events until every sender is gone. All registry mutation
    /// happens here, one event at a time.
    pub async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("Hub event channel closed, shutting down");
    }

    /// Applies a single event. Peer-specific failures funnel into `leave`;
    /// nothing here is fatal to the hub itself.
    pub fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Join { handle } => self.join(handle),
            HubEvent::Leave { id } => self.leave(id),
            HubEvent::Broadcast { frame } => self.broadcast(frame),
        }
    }

    fn join(&mut self, handle: ConnectionHandle) {
        let id = handle.id();

        if self.connections.len() >= self.max_clients {
            warn!("Server full ({} clients), rejecting client {}", self.max_clients, id);
            // The player was registered on accept; release it. Dropping the
            // handle closes the outbound queue and the write pump says
            // goodbye with a close frame.
            self.notify_removed(id);
            return;
        }

        info!("Client {} joined", id);
        self.connections.insert(id, handle);
    }

    /// Idempotent removal. Only an actual removal closes the outbound
    /// queue and fires the connection-removed hook, so the two pumps and
    /// the broadcaster may all signal the same departure safely.
    fn leave(&mut self, id: u32) {
        if self.connections.remove(&id).is_some() {
            info!("Client {} left", id);
            self.notify_removed(id);
        }
    }

    /// Fans the frame out to the membership as it stands at this instant.
    /// Every registered connection gets exactly one enqueue attempt; the
    /// ones that cannot take the frame are evicted before this pass ends.
    fn broadcast(&mut self, frame: Vec<u8>) {
        let msg = Message::Binary(frame);

        let mut congested = Vec::new();
        for (id, handle) in &self.connections {
            if !handle.enqueue_outbound(msg.clone()) {
                congested.push(*id);
            }
        }

        for id in congested {
            warn!("Client {} is not keeping up, evicting", id);
            self.leave(id);
        }
    }

    fn notify_removed(&self, id: u32) {
        if let Err(e) = self.game_tx.try_send(GameCommand::RemovePlayer { id }) {
            warn!("Failed to release player {}: {}", id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OUTBOUND_QUEUE_CAPACITY;

    fn test_hub(max_clients: usize) -> (Hub, mpsc::Receiver<GameCommand>) {
        let (game_tx, game_rx) = mpsc::channel(64);
        (Hub::new(max_clients, game_tx), game_rx)
    }

    fn test_handle(id: u32) -> (ConnectionHandle, mpsc::Receiver<Message>) {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (ConnectionHandle::new(id, out_tx), out_rx)
    }

    #[test]
    fn test_join_registers_connection() {
        let (mut hub, _game_rx) = test_hub(8);
        let (handle, _out) = test_handle(1);

        hub.handle_event(HubEvent::Join { handle });

        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_membership_is_joins_minus_leaves() {
        let (mut hub, _game_rx) = test_hub(64);
        let mut outs = Vec::new();

        for id in 1..=5 {
            let (handle, out) = test_handle(id);
            outs.push(out);
            hub.handle_event(HubEvent::Join { handle });
        }
        hub.handle_event(HubEvent::Broadcast { frame: vec![1] });
        // Everyone keeps up, so the broadcast must not change membership
        for out in &mut outs {
            let _ = out.try_recv();
        }
        hub.handle_event(HubEvent::Leave { id: 2 });
        hub.handle_event(HubEvent::Broadcast { frame: vec![2] });
        for out in &mut outs {
            let _ = out.try_recv();
        }
        hub.handle_event(HubEvent::Leave { id: 4 });

        assert_eq!(hub.len(), 3);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let (mut hub, mut game_rx) = test_hub(8);
        let (handle, _out) = test_handle(1);
        hub.handle_event(HubEvent::Join { handle });

        hub.handle_event(HubEvent::Leave { id: 1 });
        hub.handle_event(HubEvent::Leave { id: 1 });
        hub.handle_event(HubEvent::Leave { id: 99 });

        assert_eq!(hub.len(), 0);
        // The removal hook fired exactly once
        assert!(matches!(
            game_rx.try_recv(),
            Ok(GameCommand::RemovePlayer { id: 1 })
        ));
        assert!(game_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_reaches_every_member() {
        let (mut hub, _game_rx) = test_hub(8);
        let mut outs = Vec::new();
        for id in 1..=3 {
            let (handle, out) = test_handle(id);
            outs.push(out);
            hub.handle_event(HubEvent::Join { handle });
        }

        let frame = vec![0xAB; 40];
        hub.handle_event(HubEvent::Broadcast {
            frame: frame.clone(),
        });

        for out in &mut outs {
            match out.try_recv() {
                Ok(Message::Binary(data)) => assert_eq!(data, frame),
                other => panic!("Expected broadcast frame, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_congested_peer_is_evicted_others_unaffected() {
        let (mut hub, mut game_rx) = test_hub(8);
        let (handle_a, mut out_a) = test_handle(1);
        let (handle_b, mut out_b) = test_handle(2);
        let (handle_c, mut out_c) = test_handle(3);
        hub.handle_event(HubEvent::Join { handle: handle_a });
        hub.handle_event(HubEvent::Join { handle: handle_b });
        hub.handle_event(HubEvent::Join { handle: handle_c });

        // First broadcast lands everywhere
        hub.handle_event(HubEvent::Broadcast { frame: vec![1] });
        assert!(out_a.try_recv().is_ok());
        assert!(out_c.try_recv().is_ok());
        // B never drains its queue

        // B's queue is still full, so the second broadcast evicts B alone
        hub.handle_event(HubEvent::Broadcast { frame: vec![2] });
        assert_eq!(hub.len(), 2);
        assert!(matches!(
            game_rx.try_recv(),
            Ok(GameCommand::RemovePlayer { id: 2 })
        ));

        // A and C still got the second frame
        assert!(matches!(out_a.try_recv(), Ok(Message::Binary(f)) if f == vec![2]));
        assert!(matches!(out_c.try_recv(), Ok(Message::Binary(f)) if f == vec![2]));

        // A third broadcast reaches only the survivors
        hub.handle_event(HubEvent::Broadcast { frame: vec![3] });
        assert!(matches!(out_a.try_recv(), Ok(Message::Binary(f)) if f == vec![3]));
        assert!(matches!(out_c.try_recv(), Ok(Message::Binary(f)) if f == vec![3]));
        assert!(out_b.try_recv().is_err());
    }

    #[test]
    fn test_eviction_takes_effect_before_next_event() {
        let (mut hub, _game_rx) = test_hub(8);
        let (handle, _out) = test_handle(1);
        hub.handle_event(HubEvent::Join { handle });

        // Queue capacity is 1: the second unbroadcast frame finds it full
        hub.handle_event(HubEvent::Broadcast { frame: vec![1] });
        hub.handle_event(HubEvent::Broadcast { frame: vec![2] });

        // The eviction happened inside the second broadcast pass
        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn test_closed_queue_counts_as_congested() {
        let (mut hub, _game_rx) = test_hub(8);
        let (handle, out) = test_handle(1);
        hub.handle_event(HubEvent::Join { handle });
        drop(out);

        hub.handle_event(HubEvent::Broadcast { frame: vec![1] });

        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn test_join_rejected_at_capacity() {
        let (mut hub, mut game_rx) = test_hub(2);
        let (h1, _o1) = test_handle(1);
        let (h2, _o2) = test_handle(2);
        let (h3, o3) = test_handle(3);

        hub.handle_event(HubEvent::Join { handle: h1 });
        hub.handle_event(HubEvent::Join { handle: h2 });
        hub.handle_event(HubEvent::Join { handle: h3 });

        assert_eq!(hub.len(), 2);
        // The rejected client's player is released and its queue closed
        assert!(matches!(
            game_rx.try_recv(),
            Ok(GameCommand::RemovePlayer { id: 3 })
        ));
        let mut o3 = o3;
        assert!(matches!(
            o3.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_broadcast_to_empty_registry_is_noop() {
        let (mut hub, _game_rx) = test_hub(8);
        hub.handle_event(HubEvent::Broadcast { frame: vec![1] });
        assert!(hub.is_empty());
    }
}
