//! udp.rs — Datagram adapter: one sentence per UDP datagram
//!
//! Sends to every configured target and to any peer that sends us a datagram
//! (up to `max_peers`). Each destination is a `ClientConnection` with its own
//! worker, so one unreachable address never delays the others. Send errors are
//! logged and the worker carries on; a connectionless target is only dropped
//! when it lags under the `disconnect` policy or the scenario stops.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{BroadcastHub, ConnectionState, Delivery, Protocol};
use crate::inbound::{InboundMessage, InboundSender};

const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    /// From config; re-attaches after every close
    Static,
    /// Learned from an inbound datagram; forgotten on close
    Discovered,
}

pub struct DatagramAdapter {
    socket: Arc<UdpSocket>,
    hub: Arc<BroadcastHub>,
    inbound: InboundSender,
    peers: Arc<DashMap<SocketAddr, ()>>,
    max_peers: usize,
}

impl DatagramAdapter {
    pub fn new(socket: UdpSocket, hub: Arc<BroadcastHub>, inbound: InboundSender, max_peers: usize) -> Self {
        Self {
            socket: Arc::new(socket),
            hub,
            inbound,
            peers: Arc::new(DashMap::new()),
            max_peers,
        }
    }

    /// Start workers for `targets`, then receive until the socket fails.
    pub async fn serve(self, targets: Vec<SocketAddr>) {
        if let Ok(addr) = self.socket.local_addr() {
            info!("📡 UDP sentence broadcast on {addr} → {} static target(s)", targets.len());
        }
        for target in targets {
            self.peers.insert(target, ());
            self.spawn_worker(target, TargetKind::Static);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, peer) = match self.socket.recv_from(&mut buf).await {
                Ok(r) => r,
                Err(e) => {
                    // ICMP port-unreachable from a dead target shows up here on some platforms
                    debug!("UDP: recv failed: {e}");
                    continue;
                }
            };
            if !self.peers.contains_key(&peer) {
                if self.peers.len() < self.max_peers {
                    self.peers.insert(peer, ());
                    info!(%peer, "🛰 UDP peer discovered");
                    self.spawn_worker(peer, TargetKind::Discovered);
                } else {
                    debug!(%peer, "UDP: peer limit reached, not adding");
                }
            }
            let text = String::from_utf8_lossy(&buf[..n]);
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                self.inbound.offer(InboundMessage {
                    protocol: Protocol::Datagram,
                    peer,
                    line: line.to_string(),
                });
            }
        }
    }

    fn spawn_worker(&self, target: SocketAddr, kind: TargetKind) {
        let socket = self.socket.clone();
        let hub = self.hub.clone();
        let peers = self.peers.clone();
        tokio::spawn(async move {
            loop {
                send_loop(&socket, &hub, target).await;
                if kind == TargetKind::Discovered {
                    break;
                }
            }
            peers.remove(&target);
        });
    }
}

/// Deliver to one target until closed or evicted.
async fn send_loop(socket: &UdpSocket, hub: &BroadcastHub, target: SocketAddr) {
    let fanout = &hub.datagram;
    let write_timeout = hub.settings().write_timeout;
    let mut sub = fanout.attach(target);
    let conn = sub.connection().clone();

    loop {
        match sub.next().await {
            Delivery::Send(s) => match timeout(write_timeout, socket.send_to(&s.text, target)).await {
                Ok(Ok(_)) => conn.record_delivered(),
                Ok(Err(e)) => warn!(client = %conn.id, %target, "UDP: send failed: {e}"),
                Err(_) => warn!(client = %conn.id, %target, "UDP: send timed out"),
            },
            Delivery::Evict { missed } => {
                warn!(client = %conn.id, %target, missed, "UDP: target lagged, dropping");
                break;
            }
            Delivery::Closed => {
                conn.set_state(ConnectionState::Draining);
                for s in sub.drain() {
                    if socket.send_to(&s.text, target).await.is_ok() {
                        conn.record_delivered();
                    }
                }
                break;
            }
        }
    }

    fanout.detach(conn.id);
}
