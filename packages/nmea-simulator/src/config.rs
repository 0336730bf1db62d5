//! config.rs — Runtime configuration (config.toml)
//!
//! The file is optional: a missing file falls back to the copy embedded at
//! build time. A file that exists but does not parse is an error.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::broadcast::{BroadcastSettings, OverflowPolicy};
use crate::engine::{EngineConfig, SimulationSettings};
use crate::sentences::SentenceKind;

pub const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("[sentences]: unknown sentence kind '{0}'")]
    UnknownSentence(String),
    #[error("simulation.epoch: '{value}' is not RFC 3339 ({reason})")]
    InvalidEpoch { value: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullConfig {
    pub simulation: SimulationSection,
    pub network: NetworkSection,
    pub broadcast: BroadcastSection,
    /// Interval overrides in ms, keyed by `SentenceKind::key()`
    #[serde(default)]
    pub sentences: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    pub tick_hz: f64,
    pub speed: f64,
    pub epoch: String,
    #[serde(default)]
    pub magnetic_variation_deg: f64,
    pub preset: String,
    #[serde(default)]
    pub gust_seed: u64,
    #[serde(default)]
    pub heartbeat_ticks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    pub tcp_addr: String,
    pub udp_addr: String,
    pub ws_addr: String,
    #[serde(default)]
    pub udp_targets: Vec<String>,
    pub max_udp_peers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastSection {
    pub queue_capacity: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    pub write_timeout_ms: u64,
    pub inbound_capacity: usize,
}

impl FullConfig {
    /// Read `path`, or the embedded default when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found, using built-in defaults", path.display());
                DEFAULT_CONFIG.to_string()
            }
            Err(source) => return Err(ConfigError::Io { path: path.display().to_string(), source }),
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if !(sim.tick_hz.is_finite() && sim.tick_hz > 0.0 && sim.tick_hz <= 1000.0) {
            return Err(ConfigError::InvalidValue {
                field: "simulation.tick_hz",
                reason: format!("must be in (0, 1000], got {}", sim.tick_hz),
            });
        }
        if !(sim.speed.is_finite() && sim.speed > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "simulation.speed",
                reason: format!("must be > 0, got {}", sim.speed),
            });
        }
        self.epoch()?;
        self.tcp_addr()?;
        self.udp_addr()?;
        self.ws_addr()?;
        self.udp_targets()?;
        let b = &self.broadcast;
        for (field, v) in [
            ("broadcast.queue_capacity", b.queue_capacity),
            ("broadcast.inbound_capacity", b.inbound_capacity),
        ] {
            if v == 0 {
                return Err(ConfigError::InvalidValue { field, reason: "must be > 0".into() });
            }
        }
        if b.write_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue { field: "broadcast.write_timeout_ms", reason: "must be > 0".into() });
        }
        self.intervals().map(|_| ())
    }

    pub fn epoch(&self) -> Result<DateTime<Utc>, ConfigError> {
        DateTime::parse_from_rfc3339(&self.simulation.epoch)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| ConfigError::InvalidEpoch { value: self.simulation.epoch.clone(), reason: e.to_string() })
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr, ConfigError> {
        addr("network.tcp_addr", &self.network.tcp_addr)
    }

    pub fn udp_addr(&self) -> Result<SocketAddr, ConfigError> {
        addr("network.udp_addr", &self.network.udp_addr)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr, ConfigError> {
        addr("network.ws_addr", &self.network.ws_addr)
    }

    pub fn udp_targets(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        self.network.udp_targets.iter().map(|t| addr("network.udp_targets", t)).collect()
    }

    /// Built-in interval for every kind, overridden by `[sentences]`.
    pub fn intervals(&self) -> Result<Vec<(SentenceKind, Duration)>, ConfigError> {
        let mut table: BTreeMap<SentenceKind, Duration> =
            SentenceKind::ALL.iter().map(|k| (*k, k.default_interval())).collect();
        for (key, ms) in &self.sentences {
            let kind = SentenceKind::from_key(key).ok_or_else(|| ConfigError::UnknownSentence(key.clone()))?;
            table.insert(kind, Duration::from_millis(*ms));
        }
        Ok(table.into_iter().collect())
    }

    pub fn broadcast_settings(&self) -> BroadcastSettings {
        BroadcastSettings {
            queue_capacity: self.broadcast.queue_capacity,
            overflow_policy: self.broadcast.overflow_policy,
            write_timeout: Duration::from_millis(self.broadcast.write_timeout_ms),
        }
    }

    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        Ok(EngineConfig {
            tick_hz: self.simulation.tick_hz,
            speed: self.simulation.speed,
            simulation: SimulationSettings {
                epoch: self.epoch()?,
                magnetic_variation_deg: self.simulation.magnetic_variation_deg,
                intervals: self.intervals()?,
            },
            inbound_capacity: self.broadcast.inbound_capacity,
            heartbeat_ticks: self.simulation.heartbeat_ticks,
        })
    }
}

fn addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress { field, value: value.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_parses() {
        let cfg = FullConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(cfg.simulation.preset, "beat_to_windward");
        assert_eq!(cfg.tcp_addr().unwrap().port(), 10110);
        assert_eq!(cfg.broadcast_settings().overflow_policy, OverflowPolicy::DropOldest);
        let intervals = cfg.intervals().unwrap();
        assert_eq!(intervals.len(), SentenceKind::ALL.len());
        assert!(intervals.contains(&(SentenceKind::MwvApparent, Duration::from_millis(333))));
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = FullConfig::load("/nonexistent/nmea-sim.toml").unwrap();
        assert_eq!(cfg.simulation.tick_hz, 20.0);
    }

    #[test]
    fn zero_interval_disables_and_unknown_kind_fails() {
        let text = DEFAULT_CONFIG.replace("dpt = 500", "dpt = 0");
        let cfg = FullConfig::parse(&text).unwrap();
        assert!(cfg.intervals().unwrap().contains(&(SentenceKind::Dpt, Duration::ZERO)));

        let text = format!("{DEFAULT_CONFIG}\nmtw = 1000\n");
        assert!(matches!(FullConfig::parse(&text), Err(ConfigError::UnknownSentence(k)) if k == "mtw"));
    }

    #[test]
    fn bad_values_are_reported() {
        let text = DEFAULT_CONFIG.replace("tcp_addr = \"0.0.0.0:10110\"", "tcp_addr = \"nowhere\"");
        assert!(matches!(FullConfig::parse(&text), Err(ConfigError::InvalidAddress { field: "network.tcp_addr", .. })));

        let text = DEFAULT_CONFIG.replace("2024-06-01T08:00:00Z", "yesterday");
        assert!(matches!(FullConfig::parse(&text), Err(ConfigError::InvalidEpoch { .. })));

        let text = DEFAULT_CONFIG.replace("tick_hz = 20.0", "tick_hz = 0.0");
        assert!(matches!(FullConfig::parse(&text), Err(ConfigError::InvalidValue { field: "simulation.tick_hz", .. })));
    }
}
