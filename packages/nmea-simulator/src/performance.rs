//! performance.rs — Vessel profile and polar table
//!
//! The polar is indexed by apparent wind angle off the bow (0–180°, port and
//! starboard symmetric) and apparent wind speed. Lookups interpolate
//! bilinearly and clamp to the table edge; they never extrapolate.

use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::geo::signed_deg;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarTable {
    /// Strictly increasing, within [0, 180]
    pub angles_deg: Vec<f64>,
    /// Strictly increasing, non-negative
    pub speeds_kn: Vec<f64>,
    /// One row per angle, one column per wind speed
    pub stw_kn: Vec<Vec<f64>>,
}

/// Index of the lower grid line and the fraction toward the next one.
fn bracket(axis: &[f64], v: f64) -> (usize, f64) {
    let last = axis.len() - 1;
    let v = v.clamp(axis[0], axis[last]);
    let i = axis.partition_point(|x| *x <= v).saturating_sub(1).min(last - 1);
    let span = axis[i + 1] - axis[i];
    (i, ((v - axis[i]) / span).clamp(0.0, 1.0))
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<(), ScenarioError> {
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ScenarioError::PolarAxis { axis, reason: "values must be finite and ≥ 0".into() });
    }
    if values.windows(2).any(|w| w[1] <= w[0]) {
        return Err(ScenarioError::PolarAxis { axis, reason: "values must be strictly increasing".into() });
    }
    Ok(())
}

impl PolarTable {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.angles_deg.len() < 2 || self.speeds_kn.len() < 2 {
            return Err(ScenarioError::EmptyPolar);
        }
        check_axis("angle", &self.angles_deg)?;
        check_axis("speed", &self.speeds_kn)?;
        if self.angles_deg.last().is_some_and(|a| *a > 180.0) {
            return Err(ScenarioError::PolarAxis { axis: "angle", reason: "angles must not exceed 180°".into() });
        }
        if self.stw_kn.len() != self.angles_deg.len() {
            return Err(ScenarioError::PolarShape(format!(
                "{} rows for {} angles",
                self.stw_kn.len(),
                self.angles_deg.len()
            )));
        }
        for (row, angle_deg) in self.stw_kn.iter().zip(&self.angles_deg) {
            if row.len() != self.speeds_kn.len() {
                return Err(ScenarioError::PolarShape(format!(
                    "row {angle_deg}° has {} columns for {} wind speeds",
                    row.len(),
                    self.speeds_kn.len()
                )));
            }
            for (value, speed_kn) in row.iter().zip(&self.speeds_kn) {
                if !value.is_finite() || *value < 0.0 {
                    return Err(ScenarioError::PolarValue {
                        angle_deg: *angle_deg,
                        speed_kn: *speed_kn,
                        value: *value,
                    });
                }
            }
        }
        Ok(())
    }

    /// Speed through water for an apparent wind angle (any sign/wrap) and speed.
    /// Assumes a validated table.
    pub fn lookup(&self, awa_deg: f64, aws_kn: f64) -> f64 {
        let angle = signed_deg(awa_deg).abs();
        let (i, fa) = bracket(&self.angles_deg, angle);
        let (j, fs) = bracket(&self.speeds_kn, aws_kn);
        let row = |r: usize| self.stw_kn[r][j] * (1.0 - fs) + self.stw_kn[r][j + 1] * fs;
        row(i) * (1.0 - fa) + row(i + 1) * fa
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeelType {
    Fin,
    Bulb,
    Wing,
    Full,
    Centreboard,
}

impl KeelType {
    /// Leeway coefficient in degrees per knot² of apparent wind.
    pub fn default_coefficient(self) -> f64 {
        match self {
            Self::Wing => 0.014,
            Self::Bulb => 0.016,
            Self::Fin => 0.018,
            Self::Full => 0.024,
            Self::Centreboard => 0.030,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselProfile {
    pub name: String,
    pub length_m: f64,
    pub beam_m: f64,
    pub draft_m: f64,
    pub displacement_kg: f64,
    pub keel: KeelType,
    pub leeway_coefficient: f64,
    pub max_leeway_deg: f64,
    pub polar: PolarTable,
}

impl VesselProfile {
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let positive = [
            ("length_m", self.length_m),
            ("beam_m", self.beam_m),
            ("draft_m", self.draft_m),
            ("displacement_kg", self.displacement_kg),
        ];
        for (field, v) in positive {
            if !v.is_finite() || v <= 0.0 {
                return Err(ScenarioError::InvalidProfile { field, reason: format!("must be > 0, got {v}") });
            }
        }
        if !self.leeway_coefficient.is_finite() || self.leeway_coefficient < 0.0 {
            return Err(ScenarioError::InvalidProfile {
                field: "leeway_coefficient",
                reason: format!("must be ≥ 0, got {}", self.leeway_coefficient),
            });
        }
        if !(self.max_leeway_deg > 0.0 && self.max_leeway_deg <= 45.0) {
            return Err(ScenarioError::InvalidProfile {
                field: "max_leeway_deg",
                reason: format!("must be in (0, 45], got {}", self.max_leeway_deg),
            });
        }
        self.polar.validate()
    }

    /// Leeway angle in degrees, positive to starboard. Wind on the starboard
    /// side (positive AWA) pushes the hull to port.
    pub fn leeway_deg(&self, aws_kn: f64, awa_deg: f64) -> f64 {
        let raw = self.leeway_coefficient * aws_kn * aws_kn * awa_deg.to_radians().sin();
        -raw.clamp(-self.max_leeway_deg, self.max_leeway_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PolarTable {
        PolarTable {
            angles_deg: vec![0.0, 90.0, 180.0],
            speeds_kn: vec![0.0, 10.0, 20.0],
            stw_kn: vec![
                vec![0.0, 0.0, 0.0],
                vec![0.0, 6.0, 8.0],
                vec![0.0, 4.0, 6.0],
            ],
        }
    }

    fn profile() -> VesselProfile {
        VesselProfile {
            name: "test".into(),
            length_m: 10.0,
            beam_m: 3.4,
            draft_m: 1.8,
            displacement_kg: 5500.0,
            keel: KeelType::Fin,
            leeway_coefficient: KeelType::Fin.default_coefficient(),
            max_leeway_deg: 10.0,
            polar: table(),
        }
    }

    #[test]
    fn grid_points_are_exact() {
        let t = table();
        assert_eq!(t.lookup(90.0, 10.0), 6.0);
        assert_eq!(t.lookup(180.0, 20.0), 6.0);
    }

    #[test]
    fn bilinear_between_points() {
        let t = table();
        // Midway on both axes: average of 0, 6 and 0, 0 corners = 1.5
        assert!((t.lookup(45.0, 5.0) - 1.5).abs() < 1e-12);
        assert!((t.lookup(135.0, 15.0) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn clamps_outside_the_table() {
        let t = table();
        assert_eq!(t.lookup(90.0, 45.0), 8.0);
        assert_eq!(t.lookup(90.0, -3.0), 0.0);
    }

    #[test]
    fn port_and_starboard_are_symmetric() {
        let t = table();
        assert_eq!(t.lookup(-90.0, 10.0), t.lookup(90.0, 10.0));
        assert_eq!(t.lookup(270.0, 10.0), t.lookup(90.0, 10.0));
    }

    #[test]
    fn degenerate_tables_rejected() {
        let mut t = table();
        t.speeds_kn = vec![0.0];
        assert_eq!(t.validate(), Err(ScenarioError::EmptyPolar));

        let mut t = table();
        t.angles_deg = vec![0.0, 90.0, 90.0];
        assert!(matches!(t.validate(), Err(ScenarioError::PolarAxis { axis: "angle", .. })));

        let mut t = table();
        t.stw_kn[1][2] = f64::NAN;
        assert!(matches!(t.validate(), Err(ScenarioError::PolarValue { .. })));

        let mut t = table();
        t.stw_kn.pop();
        assert!(matches!(t.validate(), Err(ScenarioError::PolarShape(_))));
    }

    #[test]
    fn leeway_is_downwind_and_clamped() {
        let p = profile();
        // Wind from starboard: leeway to port (negative)
        let l = p.leeway_deg(12.0, 40.0);
        assert!(l < 0.0);
        assert!((l + 0.018 * 144.0 * 40f64.to_radians().sin()).abs() < 1e-9);
        assert_eq!(p.leeway_deg(40.0, -90.0), 10.0);
        assert_eq!(p.leeway_deg(0.0, 60.0), 0.0);
    }

    #[test]
    fn profile_dimensions_checked() {
        let mut p = profile();
        p.draft_m = 0.0;
        assert!(matches!(p.validate(), Err(ScenarioError::InvalidProfile { field: "draft_m", .. })));
        assert!(profile().validate().is_ok());
    }
}
