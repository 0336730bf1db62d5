//! nmea-simulator — Physics-grounded NMEA generation and broadcast engine
//!
//! A vessel model advanced on a fixed tick feeds a per-sentence scheduler;
//! every due sentence is encoded once and fanned out to TCP, UDP and
//! WebSocket clients. See `main.rs` for the `nmea-sim` binary.

pub mod broadcast;
pub mod config;
pub mod digest;
pub mod engine;
pub mod environment;
pub mod error;
pub mod geo;
pub mod inbound;
pub mod navigation;
pub mod performance;
pub mod scenarios;
pub mod scheduler;
pub mod sentences;
pub mod vessel;

pub use broadcast::{BroadcastHub, BroadcastSettings, OverflowPolicy, Protocol};
pub use config::{ConfigError, FullConfig};
pub use engine::{Engine, EngineConfig, EngineStatus, PlanEdit, Scenario, Simulation, SimulationSettings};
pub use error::{EngineError, ScenarioError};
pub use sentences::{OutboundSentence, SentenceKind};
pub use vessel::SimulationState;
