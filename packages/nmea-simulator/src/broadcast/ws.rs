//! ws.rs — Message-framed adapter: JSON envelopes over WebSocket
//!
//! `GET /nmea` upgrades to a WebSocket that receives one
//! `{"type","payload","timestamp"}` text frame per sentence. Text frames the
//! client sends are treated as inbound sentences (one per line).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use nmea_types::FramedSentence;
use tokio::time::timeout;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use super::{BroadcastHub, ConnectionState, Delivery, Protocol};
use crate::inbound::{InboundMessage, InboundSender};
use crate::sentences::OutboundSentence;

#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<BroadcastHub>,
    pub inbound: InboundSender,
}

/// `/nmea` and `/health`. Serve with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn router(hub: Arc<BroadcastHub>, inbound: InboundSender) -> Router {
    Router::new()
        .route("/nmea", get(ws_handler))
        .route("/health", get(|| async { "nmea-sim ok" }))
        .with_state(WsState { hub, inbound })
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// The JSON text frame sent for `s`.
pub fn envelope(s: &OutboundSentence) -> Option<String> {
    match FramedSentence::new(s.tag(), s.as_str(), s.timestamp_ms).to_json() {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("WS: serialize failed: {e}");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: WsState) {
    let fanout = &state.hub.framed;
    let write_timeout = state.hub.settings().write_timeout;
    let mut sub = fanout.attach(peer);
    let conn = sub.connection().clone();
    info!(client = %conn.id, %peer, "🔌 WebSocket client connected");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let inbound = state.inbound.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(result) = ws_stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    for line in text.lines().filter(|l| !l.trim().is_empty()) {
                        inbound.offer(InboundMessage {
                            protocol: Protocol::Framed,
                            peer,
                            line: line.to_string(),
                        });
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(%peer, "WS: receive failed: {e}");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            delivery = sub.next() => match delivery {
                Delivery::Send(s) => {
                    let Some(json) = envelope(&s) else { continue };
                    match timeout(write_timeout, ws_sink.send(Message::Text(json))).await {
                        Ok(Ok(())) => conn.record_delivered(),
                        Ok(Err(e)) => {
                            debug!(client = %conn.id, "WS: send failed: {e}");
                            break;
                        }
                        Err(_) => {
                            warn!(client = %conn.id, "WS: send timed out after {write_timeout:?}");
                            break;
                        }
                    }
                }
                Delivery::Evict { missed } => {
                    warn!(client = %conn.id, %peer, missed, "WS: client too slow, disconnecting");
                    break;
                }
                Delivery::Closed => {
                    conn.set_state(ConnectionState::Draining);
                    for s in sub.drain() {
                        let Some(json) = envelope(&s) else { continue };
                        match timeout(write_timeout, ws_sink.send(Message::Text(json))).await {
                            Ok(Ok(())) => conn.record_delivered(),
                            _ => break,
                        }
                    }
                    break;
                }
            },
            _ = &mut reader => {
                debug!(client = %conn.id, "WS: client went away");
                break;
            }
        }
    }

    reader.abort();
    let _ = timeout(write_timeout, ws_sink.send(Message::Close(None))).await;
    fanout.detach(conn.id);
    info!(client = %conn.id, %peer, "WebSocket client closed");
}
