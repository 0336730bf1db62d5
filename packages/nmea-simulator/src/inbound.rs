//! inbound.rs — Client-to-engine path
//!
//! Adapters hand every received line to a bounded queue with `try_send`; a
//! full queue drops the line (counted) so a chatty client can never stall a
//! reader. A single consumer task decodes each line through `Engine::inject`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::broadcast::Protocol;
use crate::engine::Engine;

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub protocol: Protocol,
    pub peer: SocketAddr,
    pub line: String,
}

#[derive(Clone)]
pub struct InboundSender {
    tx: mpsc::Sender<InboundMessage>,
    dropped: Arc<AtomicU64>,
}

impl InboundSender {
    /// Queue a line without waiting. Returns false if it was dropped.
    pub fn offer(&self, msg: InboundMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(peer = %msg.peer, protocol = ?msg.protocol, "Inbound queue full, dropping line");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Count a line an adapter refused before queueing.
    pub fn record_discard(&self, protocol: Protocol, peer: SocketAddr, reason: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(%peer, ?protocol, "Inbound line discarded: {reason}");
    }
}

pub fn channel(capacity: usize, dropped: Arc<AtomicU64>) -> (InboundSender, mpsc::Receiver<InboundMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (InboundSender { tx, dropped }, rx)
}

/// Decode loop. Ends when every sender is gone.
pub async fn run(mut rx: mpsc::Receiver<InboundMessage>, engine: Arc<Engine>) {
    while let Some(msg) = rx.recv().await {
        let line = msg.line.trim();
        if line.is_empty() {
            continue;
        }
        if let Ok(sentence) = engine.inject(line).await {
            debug!(peer = %msg.peer, protocol = ?msg.protocol, kind = sentence.kind(), "inbound sentence");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let dropped = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = channel(2, dropped.clone());
        let msg = || InboundMessage {
            protocol: Protocol::Stream,
            peer: "127.0.0.1:1".parse().unwrap(),
            line: "$GPRMC,BADDATA*00".into(),
        };
        assert!(tx.offer(msg()));
        assert!(tx.offer(msg()));
        assert!(!tx.offer(msg()));
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert!(rx.recv().await.is_some());
    }
}
