//! main.rs — nmea-sim entry point
//!
//! Runs one engine and three broadcast adapters side by side:
//!   1. TCP: raw sentence stream, inbound lines decoded
//!   2. UDP: datagram per sentence to static targets and discovered peers
//!   3. HTTP: `/nmea` framed WebSocket stream, `/control` command socket, `/health`
//!
//! Ctrl-C stops the scenario (draining every client) before exit.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use clap::Parser;
use serde_json::json;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{error, info, warn};

use nmea_simulator::broadcast::{tcp, udp::DatagramAdapter, ws};
use nmea_simulator::{scenarios, BroadcastHub, Engine, FullConfig};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "nmea-sim", about = "NMEA 0183/2000 instrument simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Scenario preset to load on startup
    #[arg(long)]
    preset: Option<String>,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long)]
    speed: Option<f64>,
    /// TCP sentence stream bind address
    #[arg(long)]
    tcp_addr: Option<String>,
    /// UDP datagram bind address
    #[arg(long)]
    udp_addr: Option<String>,
    /// WebSocket / control bind address
    #[arg(long)]
    ws_addr: Option<String>,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nmea_simulator=info,nmea_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut cfg = FullConfig::load(&args.config)?;
    if let Some(p) = args.preset {
        cfg.simulation.preset = p;
    }
    if let Some(s) = args.speed {
        cfg.simulation.speed = s;
    }
    if let Some(a) = args.tcp_addr {
        cfg.network.tcp_addr = a;
    }
    if let Some(a) = args.udp_addr {
        cfg.network.udp_addr = a;
    }
    if let Some(a) = args.ws_addr {
        cfg.network.ws_addr = a;
    }
    cfg.validate()?;

    info!(
        "🛥  NMEA simulator starting — preset '{}', {} Hz × {}",
        cfg.simulation.preset, cfg.simulation.tick_hz, cfg.simulation.speed
    );

    let hub = Arc::new(BroadcastHub::new(cfg.broadcast_settings()));
    let engine = Engine::new(cfg.engine_config()?, hub.clone());
    let inbound = engine.start_inbound();

    // Stream adapter
    let tcp_listener = TcpListener::bind(cfg.tcp_addr()?)
        .await
        .with_context(|| format!("binding TCP {}", cfg.network.tcp_addr))?;
    tokio::spawn(tcp::serve(tcp_listener, hub.clone(), inbound.clone()));

    // Datagram adapter
    let udp_socket = UdpSocket::bind(cfg.udp_addr()?)
        .await
        .with_context(|| format!("binding UDP {}", cfg.network.udp_addr))?;
    let datagram = DatagramAdapter::new(udp_socket, hub.clone(), inbound.clone(), cfg.network.max_udp_peers);
    tokio::spawn(datagram.serve(cfg.udp_targets()?));

    let seed = cfg.simulation.gust_seed;
    engine
        .load_preset(&cfg.simulation.preset, seed)
        .await
        .with_context(|| format!("known presets: {:?}", scenarios::PRESET_NAMES))?;

    // Framed stream + control
    let control = Router::new()
        .route("/control", get(control_handler))
        .with_state(ControlState { engine: engine.clone(), seed });
    let app = ws::router(hub.clone(), inbound).merge(control);

    let ws_addr = cfg.ws_addr()?;
    let listener = TcpListener::bind(ws_addr).await.with_context(|| format!("binding WS {ws_addr}"))?;
    info!("🖥  Framed stream at ws://{ws_addr}/nmea, control at ws://{ws_addr}/control");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        res = server => {
            if let Err(e) = res {
                error!("HTTP server failed: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }

    engine.stop().await;
    Ok(())
}

// ── WebSocket control handler ─────────────────────────────────────────────────

#[derive(Clone)]
struct ControlState {
    engine: Arc<Engine>,
    seed: u64,
}

async fn control_handler(ws: WebSocketUpgrade, State(state): State<ControlState>) -> Response {
    ws.on_upgrade(move |socket| handle_control(socket, state))
}

async fn handle_control(mut socket: WebSocket, state: ControlState) {
    let hello = status_reply(&state.engine).await;
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(raw) = msg else { continue };
        let reply = handle_command(&state, &raw).await;
        if socket.send(Message::Text(reply.to_string())).await.is_err() {
            break;
        }
    }
}

async fn status_reply(engine: &Engine) -> serde_json::Value {
    json!({ "type": "status", "data": engine.status().await })
}

fn error_reply(message: impl std::fmt::Display) -> serde_json::Value {
    json!({ "type": "error", "message": message.to_string() })
}

/// Handle commands from a control client.
/// Commands are JSON: { "cmd": "...", "args": {...} }
async fn handle_command(state: &ControlState, raw: &str) -> serde_json::Value {
    let v: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return error_reply(format!("invalid command JSON: {e}")),
    };
    let engine = &state.engine;
    let cmd = v["cmd"].as_str().unwrap_or("");
    match cmd {
        "status" => status_reply(engine).await,
        "stop" => {
            engine.stop().await;
            status_reply(engine).await
        }
        "preset" => {
            let name = v["args"]["name"].as_str().unwrap_or("");
            let seed = v["args"]["seed"].as_u64().unwrap_or(state.seed);
            match engine.load_preset(name, seed).await {
                Ok(()) => {
                    info!("🎭 Preset '{name}' loaded");
                    status_reply(engine).await
                }
                Err(e) => {
                    warn!("Preset '{name}' not loaded: {e}");
                    error_reply(e)
                }
            }
        }
        "inject" => {
            let line = v["args"]["line"].as_str().unwrap_or("");
            match engine.inject(line).await {
                Ok(s) => json!({ "type": "accepted", "kind": s.kind(), "sentence": s.to_string() }),
                Err(e) => error_reply(e),
            }
        }
        _ => {
            warn!("Unknown control command: {cmd}");
            error_reply(format!("unknown command '{cmd}'"))
        }
    }
}
