//! environment.rs — Time-indexed wind, current and tide
//!
//! Three independent breakpoint series, each interpolated linearly in time.
//! Before the first breakpoint and after the last the end value holds.
//! Directions interpolate along the shorter arc.

use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::geo::{normalize_deg, signed_deg};

/// True wind. `direction_deg` is where the wind blows FROM.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WindSample {
    pub speed_kn: f64,
    pub direction_deg: f64,
}

/// Tidal/ocean current. `set_deg` is where the water flows TOWARD.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CurrentSample {
    pub speed_kn: f64,
    pub set_deg: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint<T> {
    pub t_s: f64,
    pub value: T,
}

impl<T> Breakpoint<T> {
    pub fn new(t_s: f64, value: T) -> Self {
        Self { t_s, value }
    }
}

trait Interpolate: Copy {
    fn lerp(a: Self, b: Self, f: f64) -> Self;
}

impl Interpolate for f64 {
    fn lerp(a: f64, b: f64, f: f64) -> f64 {
        a + (b - a) * f
    }
}

fn lerp_direction(a: f64, b: f64, f: f64) -> f64 {
    normalize_deg(a + signed_deg(b - a) * f)
}

impl Interpolate for WindSample {
    fn lerp(a: Self, b: Self, f: f64) -> Self {
        Self {
            speed_kn: f64::lerp(a.speed_kn, b.speed_kn, f),
            direction_deg: lerp_direction(a.direction_deg, b.direction_deg, f),
        }
    }
}

impl Interpolate for CurrentSample {
    fn lerp(a: Self, b: Self, f: f64) -> Self {
        Self {
            speed_kn: f64::lerp(a.speed_kn, b.speed_kn, f),
            set_deg: lerp_direction(a.set_deg, b.set_deg, f),
        }
    }
}

fn sample<T: Interpolate>(series: &[Breakpoint<T>], t: f64) -> Option<T> {
    let first = series.first()?;
    let last = series.last()?;
    if t <= first.t_s {
        return Some(first.value);
    }
    if t >= last.t_s {
        return Some(last.value);
    }
    // First breakpoint strictly after t; guaranteed in 1..len by the checks above.
    let hi = series.partition_point(|b| b.t_s <= t);
    let (a, b) = (&series[hi - 1], &series[hi]);
    let span = b.t_s - a.t_s;
    if span <= 0.0 {
        return Some(b.value);
    }
    Some(T::lerp(a.value, b.value, (t - a.t_s) / span))
}

/// Everything the environment says about one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Conditions {
    pub wind: WindSample,
    pub current: CurrentSample,
    pub tide_m: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnvironmentTimeline {
    pub wind: Vec<Breakpoint<WindSample>>,
    /// Empty means slack water
    pub current: Vec<Breakpoint<CurrentSample>>,
    /// Empty means tide height 0
    pub tide: Vec<Breakpoint<f64>>,
}

impl EnvironmentTimeline {
    /// Constant wind, no current, constant tide.
    pub fn steady(wind: WindSample, tide_m: f64) -> Self {
        Self {
            wind: vec![Breakpoint::new(0.0, wind)],
            current: vec![],
            tide: vec![Breakpoint::new(0.0, tide_m)],
        }
    }

    pub fn at(&self, t_s: f64) -> Conditions {
        Conditions {
            wind: sample(&self.wind, t_s).unwrap_or_default(),
            current: sample(&self.current, t_s).unwrap_or_default(),
            tide_m: sample(&self.tide, t_s).unwrap_or(0.0),
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.wind.is_empty() {
            return Err(ScenarioError::EmptyWind);
        }
        check_times("wind", &self.wind)?;
        check_times("current", &self.current)?;
        check_times("tide", &self.tide)?;

        let bad_speed = |v: f64| !v.is_finite() || v < 0.0;
        if self.wind.iter().any(|b| bad_speed(b.value.speed_kn) || !b.value.direction_deg.is_finite()) {
            return Err(ScenarioError::Timeline {
                series: "wind",
                reason: "speeds must be finite and non-negative, directions finite".into(),
            });
        }
        if self.current.iter().any(|b| bad_speed(b.value.speed_kn) || !b.value.set_deg.is_finite()) {
            return Err(ScenarioError::Timeline {
                series: "current",
                reason: "speeds must be finite and non-negative, sets finite".into(),
            });
        }
        if self.tide.iter().any(|b| !b.value.is_finite()) {
            return Err(ScenarioError::Timeline {
                series: "tide",
                reason: "heights must be finite".into(),
            });
        }
        Ok(())
    }
}

fn check_times<T>(series: &'static str, points: &[Breakpoint<T>]) -> Result<(), ScenarioError> {
    if points.iter().any(|b| !b.t_s.is_finite()) {
        return Err(ScenarioError::Timeline { series, reason: "breakpoint time is not finite".into() });
    }
    if points.windows(2).any(|w| w[1].t_s < w[0].t_s) {
        return Err(ScenarioError::Timeline { series, reason: "breakpoints must be ordered by time".into() });
    }
    Ok(())
}
