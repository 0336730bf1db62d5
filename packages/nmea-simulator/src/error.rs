//! error.rs — Scenario and engine errors
//!
//! Scenario errors are configuration defects: they surface synchronously from
//! `Engine::load_scenario` and nothing starts. Runtime decode failures are not
//! here; they are counted and logged, never propagated.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScenarioError {
    #[error("polar table is empty or smaller than 2×2")]
    EmptyPolar,

    #[error("polar {axis} axis: {reason}")]
    PolarAxis { axis: &'static str, reason: String },

    #[error("polar table shape: {0}")]
    PolarShape(String),

    #[error("polar value at {angle_deg}°/{speed_kn} kn is {value} (must be finite and ≥ 0)")]
    PolarValue { angle_deg: f64, speed_kn: f64, value: f64 },

    #[error("vessel profile {field}: {reason}")]
    InvalidProfile { field: &'static str, reason: String },

    #[error("environment has no wind breakpoints")]
    EmptyWind,

    #[error("{series} timeline: {reason}")]
    Timeline { series: &'static str, reason: String },

    #[error("navigation plan has no waypoints")]
    EmptyPlan,

    #[error("navigation plan {field}: {reason}")]
    InvalidPlan { field: &'static str, reason: String },

    #[error("waypoint {id:?}: {reason}")]
    InvalidWaypoint { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scenario rejected: {0}")]
    Scenario(#[from] ScenarioError),

    #[error("unknown preset {0:?}")]
    UnknownPreset(String),
}
