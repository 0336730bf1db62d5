//! broadcast — Fan-out of encoded sentences to every connected client
//!
//! Each protocol adapter owns one [`FanOut`]: a bounded `tokio::sync::broadcast`
//! ring plus a registry of live connections. Every connection reads the ring
//! through its own receiver, so its pending queue is bounded by the ring
//! capacity and a stalled reader only ever hurts itself:
//!   - `drop_oldest`: the lagging client skips what it missed (counted)
//!   - `disconnect`: the lagging client is evicted
//! Publishing never waits on a client.

pub mod tcp;
pub mod udp;
pub mod ws;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sentences::OutboundSentence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Raw CRLF-terminated sentences over TCP
    Stream,
    /// One sentence per UDP datagram
    Datagram,
    /// JSON envelopes over WebSocket
    Framed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Draining,
    Closed,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub write_timeout: std::time::Duration,
}

// ── Connection ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ClientConnection {
    pub id: Uuid,
    pub protocol: Protocol,
    pub peer: SocketAddr,
    state: AtomicU8,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Status row for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub protocol: Protocol,
    pub peer: SocketAddr,
    pub state: ConnectionState,
    pub delivered: u64,
    pub dropped: u64,
}

impl ClientConnection {
    fn new(protocol: Protocol, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol,
            peer,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, s: ConnectionState) {
        self.state.store(s as u8, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            protocol: self.protocol,
            peer: self.peer,
            state: self.state(),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// What a connection worker should do next.
#[derive(Debug)]
pub enum Delivery {
    Send(OutboundSentence),
    /// Lagged under the `disconnect` policy
    Evict { missed: u64 },
    /// Scenario stopped or hub dropped: drain and close
    Closed,
}

/// One connection's bounded view of the fan-out ring.
pub struct ClientSubscription {
    rx: broadcast::Receiver<OutboundSentence>,
    close_rx: watch::Receiver<u64>,
    conn: Arc<ClientConnection>,
    policy: OverflowPolicy,
}

impl ClientSubscription {
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.conn
    }

    pub async fn next(&mut self) -> Delivery {
        loop {
            tokio::select! {
                biased;
                _ = self.close_rx.changed() => return Delivery::Closed,
                r = self.rx.recv() => match r {
                    Ok(s) => return Delivery::Send(s),
                    Err(RecvError::Lagged(n)) => {
                        self.conn.record_dropped(n);
                        match self.policy {
                            OverflowPolicy::DropOldest => {
                                warn!(client = %self.conn.id, peer = %self.conn.peer, lagged = n, "Client lagged, skipping {n} sentences");
                            }
                            OverflowPolicy::Disconnect => return Delivery::Evict { missed: n },
                        }
                    }
                    Err(RecvError::Closed) => return Delivery::Closed,
                },
            }
        }
    }

    /// Whatever is still queued for this connection, without waiting.
    pub fn drain(&mut self) -> Vec<OutboundSentence> {
        let mut pending = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(s) => pending.push(s),
                Err(TryRecvError::Lagged(n)) => self.conn.record_dropped(n),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        pending
    }
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

pub struct FanOut {
    protocol: Protocol,
    tx: broadcast::Sender<OutboundSentence>,
    clients: DashMap<Uuid, Arc<ClientConnection>>,
    policy: OverflowPolicy,
    close_tx: watch::Sender<u64>,
}

impl FanOut {
    pub fn new(protocol: Protocol, capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (close_tx, _) = watch::channel(0);
        Self { protocol, tx, clients: DashMap::new(), policy, close_tx }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Queue `sentence` for every attached connection. Returns how many
    /// receivers it reached.
    pub fn publish(&self, sentence: &OutboundSentence) -> usize {
        self.tx.send(sentence.clone()).unwrap_or(0)
    }

    /// Register a new connection. It receives sentences published from now on.
    pub fn attach(&self, peer: SocketAddr) -> ClientSubscription {
        let conn = Arc::new(ClientConnection::new(self.protocol, peer));
        let sub = ClientSubscription {
            rx: self.tx.subscribe(),
            close_rx: self.close_tx.subscribe(),
            conn: conn.clone(),
            policy: self.policy,
        };
        conn.set_state(ConnectionState::Open);
        self.clients.insert(conn.id, conn);
        debug!(protocol = ?self.protocol, %peer, "client attached");
        sub
    }

    pub fn detach(&self, id: Uuid) {
        if let Some((_, conn)) = self.clients.remove(&id) {
            conn.set_state(ConnectionState::Closed);
            debug!(client = %id, peer = %conn.peer, "client detached");
        }
    }

    /// Ask every current connection to drain and close.
    pub fn close_all(&self) {
        for c in self.clients.iter() {
            c.set_state(ConnectionState::Draining);
        }
        self.close_tx.send_modify(|epoch| *epoch += 1);
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.clients.iter().map(|c| c.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ── Hub ───────────────────────────────────────────────────────────────────────

/// The three adapters' fan-outs behind one `publish`.
pub struct BroadcastHub {
    pub stream: FanOut,
    pub datagram: FanOut,
    pub framed: FanOut,
    settings: BroadcastSettings,
}

impl BroadcastHub {
    pub fn new(settings: BroadcastSettings) -> Self {
        let fan = |p| FanOut::new(p, settings.queue_capacity, settings.overflow_policy);
        Self {
            stream: fan(Protocol::Stream),
            datagram: fan(Protocol::Datagram),
            framed: fan(Protocol::Framed),
            settings,
        }
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    /// The same sentence, by value, to every adapter.
    pub fn publish(&self, sentence: &OutboundSentence) {
        self.stream.publish(sentence);
        self.datagram.publish(sentence);
        self.framed.publish(sentence);
    }

    pub fn close_all(&self) {
        self.stream.close_all();
        self.datagram.close_all();
        self.framed.close_all();
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let mut rows = self.stream.connections();
        rows.extend(self.datagram.connections());
        rows.extend(self.framed.connections());
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentences::SentenceKind;
    use bytes::Bytes;

    fn sentence(tick: u64) -> OutboundSentence {
        OutboundSentence {
            kind: SentenceKind::Hdt,
            text: Bytes::from(format!("$HEHDT,{tick}.0,T*00\r\n")),
            timestamp_ms: tick,
            tick,
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    #[tokio::test]
    async fn drop_oldest_skips_and_counts() {
        let fan = FanOut::new(Protocol::Stream, 4, OverflowPolicy::DropOldest);
        let mut slow = fan.attach(peer());
        for t in 0..10 {
            fan.publish(&sentence(t));
        }
        match slow.next().await {
            Delivery::Send(s) => assert_eq!(s.tick, 6),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(slow.connection().info().dropped, 6);
    }

    #[tokio::test]
    async fn disconnect_policy_evicts_laggard_only() {
        let fan = FanOut::new(Protocol::Stream, 4, OverflowPolicy::Disconnect);
        let mut slow = fan.attach(peer());
        let mut fast = fan.attach(peer());
        for t in 0..10 {
            fan.publish(&sentence(t));
            match fast.next().await {
                Delivery::Send(s) => assert_eq!(s.tick, t),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(slow.next().await, Delivery::Evict { missed: 6 }));
    }

    #[tokio::test]
    async fn close_all_reaches_existing_clients_only() {
        let fan = FanOut::new(Protocol::Framed, 8, OverflowPolicy::DropOldest);
        let mut old = fan.attach(peer());
        fan.publish(&sentence(1));
        fan.close_all();
        let mut new = fan.attach(peer());

        assert!(matches!(old.next().await, Delivery::Closed));
        assert_eq!(old.drain().len(), 1);

        fan.publish(&sentence(2));
        assert!(matches!(new.next().await, Delivery::Send(_)));
    }

    #[tokio::test]
    async fn hub_publishes_to_every_protocol() {
        let hub = BroadcastHub::new(BroadcastSettings {
            queue_capacity: 8,
            overflow_policy: OverflowPolicy::DropOldest,
            write_timeout: std::time::Duration::from_secs(1),
        });
        let mut subs = [hub.stream.attach(peer()), hub.datagram.attach(peer()), hub.framed.attach(peer())];
        hub.publish(&sentence(5));
        for sub in subs.iter_mut() {
            assert!(matches!(sub.next().await, Delivery::Send(s) if s.tick == 5));
        }
        assert_eq!(hub.connections().len(), 3);
    }
}
