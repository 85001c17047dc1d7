//! # Snapshot Broadcast Server Library
//!
//! This library implements a real-time WebSocket server that pushes a
//! binary snapshot of shared world state to every connected peer at a
//! fixed tick rate, while accepting asynchronous input frames from each
//! peer.
//!
//! ## Architecture
//!
//! All state is owned by exactly one task; tasks communicate only through
//! bounded channels:
//!
//! - **Hub** (`hub`): the single owner of connection membership. It
//!   consumes Join/Leave/Broadcast events in arrival order and fans each
//!   snapshot frame out to every registered connection's outbound queue.
//!   A peer whose queue is full gets evicted on the spot, so one congested
//!   consumer never delays the others or the event loop.
//! - **Tick loop** (`tick`): a fixed-period timer that drains pending
//!   game commands, advances the simulation by the measured delta, and
//!   hands the encoded snapshot frame to the hub without blocking.
//! - **Connections** (`connection`): two pumps per peer. The read pump
//!   deframes inbound payloads and forwards them as player input under a
//!   liveness deadline; the write pump drains the outbound queue and
//!   emits ping probes. Either pump's failure resolves to exactly one
//!   Leave event.
//! - **Network** (`network`): the TCP accept loop and WebSocket upgrade,
//!   allocating connection ids and spawning the pumps.
//! - **Game** (`game`): the entity simulation producing the snapshots.
//!
//! ## Wire format
//!
//! Every payload in both directions travels as a binary WebSocket message
//! containing a `u16` little-endian length prefix followed by that many
//! payload bytes (see the `shared` crate). Heartbeats use ping/pong
//! control frames and never touch the payload framing. Delivery is
//! best-effort latest-state: a dropped snapshot is superseded by the next
//! tick, never retransmitted.

pub mod connection;
pub mod game;
pub mod hub;
pub mod network;
pub mod tick;
