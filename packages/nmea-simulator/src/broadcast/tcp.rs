//! tcp.rs — Stream adapter: raw sentences over long-lived TCP connections
//!
//! One writer loop per connection pulls from that connection's subscription
//! and writes with a timeout; a client that stops reading either lags (and
//! skips) or times out (and is closed). Lines the client sends go to the
//! inbound queue, capped at [`MAX_LINE`] bytes. A client that closes its
//! sending side keeps receiving.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{BroadcastHub, ConnectionState, Delivery, Protocol};
use crate::inbound::{InboundMessage, InboundSender};
use crate::sentences::OutboundSentence;

/// Longest inbound line accepted, excluding the terminator. Longer lines are
/// discarded up to the next newline.
pub const MAX_LINE: usize = 512;

/// Accept loop. Runs until the listener fails.
pub async fn serve(listener: TcpListener, hub: Arc<BroadcastHub>, inbound: InboundSender) {
    if let Ok(addr) = listener.local_addr() {
        info!("📡 TCP sentence stream on {addr}");
    }
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let _ = stream.set_nodelay(true);
                tokio::spawn(handle_client(stream, peer, hub.clone(), inbound.clone()));
            }
            Err(e) => {
                warn!("TCP: accept failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_client(stream: TcpStream, peer: SocketAddr, hub: Arc<BroadcastHub>, inbound: InboundSender) {
    let fanout = &hub.stream;
    let write_timeout = hub.settings().write_timeout;
    let mut sub = fanout.attach(peer);
    let conn = sub.connection().clone();
    info!(client = %conn.id, %peer, "🔌 TCP client connected");

    let (reader, mut writer) = stream.into_split();
    let mut reader_task = tokio::spawn(read_lines(reader, peer, inbound));
    let mut reading = true;

    loop {
        tokio::select! {
            delivery = sub.next() => match delivery {
                Delivery::Send(s) => {
                    if !write(&mut writer, &s, write_timeout, &conn.id).await {
                        break;
                    }
                    conn.record_delivered();
                }
                Delivery::Evict { missed } => {
                    warn!(client = %conn.id, %peer, missed, "TCP: client too slow, disconnecting");
                    break;
                }
                Delivery::Closed => {
                    conn.set_state(ConnectionState::Draining);
                    for s in sub.drain() {
                        if !write(&mut writer, &s, write_timeout, &conn.id).await {
                            break;
                        }
                        conn.record_delivered();
                    }
                    break;
                }
            },
            _ = &mut reader_task, if reading => {
                debug!(client = %conn.id, "TCP: client stopped sending, still streaming");
                reading = false;
            }
        }
    }

    reader_task.abort();
    let _ = writer.shutdown().await;
    fanout.detach(conn.id);
    info!(client = %conn.id, %peer, "TCP client closed");
}

async fn write(writer: &mut OwnedWriteHalf, s: &OutboundSentence, limit: Duration, id: &uuid::Uuid) -> bool {
    match timeout(limit, writer.write_all(&s.text)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(client = %id, "TCP: write failed: {e}");
            false
        }
        Err(_) => {
            warn!(client = %id, "TCP: write timed out after {limit:?}");
            false
        }
    }
}

async fn read_lines(reader: OwnedReadHalf, peer: SocketAddr, inbound: InboundSender) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(MAX_LINE + 2);
    // Set while skipping the rest of an over-long line
    let mut discarding = false;
    loop {
        buf.clear();
        let read = (&mut reader).take(MAX_LINE as u64 + 2).read_until(b'\n', &mut buf).await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                let terminated = buf.last() == Some(&b'\n');
                if discarding {
                    discarding = !terminated;
                    continue;
                }
                let line = trim_terminator(&buf);
                if line.len() > MAX_LINE {
                    inbound.record_discard(Protocol::Stream, peer, "line too long");
                    discarding = !terminated;
                    continue;
                }
                let line = String::from_utf8_lossy(line).into_owned();
                inbound.offer(InboundMessage { protocol: Protocol::Stream, peer, line });
            }
            Err(e) => {
                debug!(%peer, "TCP: read failed: {e}");
                break;
            }
        }
    }
}

fn trim_terminator(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
