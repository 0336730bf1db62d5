//! navigation.rs — Waypoint plan and tacking state machine
//!
//! `DIRECT` steers the bearing to the active waypoint. When that bearing comes
//! within `min_tack_angle_deg` of the true wind the planner switches to
//! `TACKING`: it holds the bearing offset by ±`corridor_half_width_deg` and
//! flips side each time cross-track error passes `corridor_half_width_nm` on
//! the side it is heading toward. Every flip opens a maneuver window during
//! which speed through water is multiplied by `tack_efficiency`.

use nmea_types::LatLon;
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::geo::{self, angle_between, normalize_deg};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: String,
    pub position: LatLon,
}

impl Waypoint {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self { id: id.into(), position: LatLon::new(lat, lon) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationPlan {
    pub start: LatLon,
    pub waypoints: Vec<Waypoint>,
    /// Heading offset from the direct bearing while tacking
    pub corridor_half_width_deg: f64,
    /// Cross-track distance that triggers a tack
    pub corridor_half_width_nm: f64,
    pub min_tack_angle_deg: f64,
    /// Extra angle beyond `min_tack_angle_deg` needed to return to DIRECT
    pub hysteresis_deg: f64,
    /// Speed multiplier (0–1] applied during the maneuver window
    pub tack_efficiency: f64,
    pub maneuver_window_s: f64,
    pub arrival_radius_nm: f64,
}

impl NavigationPlan {
    /// Plan with the usual cruising defaults: 15° / 0.1 nm corridor, 45° no-go,
    /// 5° hysteresis, 0.9 efficiency over 8 s, 0.05 nm arrival radius.
    pub fn new(start: LatLon, waypoints: Vec<Waypoint>) -> Self {
        Self {
            start,
            waypoints,
            corridor_half_width_deg: 15.0,
            corridor_half_width_nm: 0.1,
            min_tack_angle_deg: 45.0,
            hysteresis_deg: 5.0,
            tack_efficiency: 0.9,
            maneuver_window_s: 8.0,
            arrival_radius_nm: 0.05,
        }
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.waypoints.is_empty() {
            return Err(ScenarioError::EmptyPlan);
        }
        let invalid = |field, reason: &str| Err(ScenarioError::InvalidPlan { field, reason: reason.into() });
        if !valid_position(self.start) {
            return invalid("start", "latitude/longitude out of range");
        }
        if !(self.corridor_half_width_deg > 0.0 && self.corridor_half_width_deg < 90.0) {
            return invalid("corridor_half_width_deg", "must be in (0, 90)");
        }
        if !(self.corridor_half_width_nm > 0.0 && self.corridor_half_width_nm.is_finite()) {
            return invalid("corridor_half_width_nm", "must be > 0");
        }
        if !(self.min_tack_angle_deg > 0.0 && self.min_tack_angle_deg < 90.0) {
            return invalid("min_tack_angle_deg", "must be in (0, 90)");
        }
        if !(self.hysteresis_deg >= 0.0 && self.min_tack_angle_deg + self.hysteresis_deg < 180.0) {
            return invalid("hysteresis_deg", "must be ≥ 0 and keep the exit angle below 180°");
        }
        if !(self.tack_efficiency > 0.0 && self.tack_efficiency <= 1.0) {
            return invalid("tack_efficiency", "must be in (0, 1]");
        }
        if !(self.maneuver_window_s >= 0.0 && self.maneuver_window_s.is_finite()) {
            return invalid("maneuver_window_s", "must be ≥ 0");
        }
        if !(self.arrival_radius_nm > 0.0 && self.arrival_radius_nm.is_finite()) {
            return invalid("arrival_radius_nm", "must be > 0");
        }
        for wp in &self.waypoints {
            validate_waypoint(wp)?;
        }
        Ok(())
    }
}

fn valid_position(p: LatLon) -> bool {
    p.lat.is_finite() && p.lon.is_finite() && p.lat.abs() < 89.0 && p.lon.abs() <= 180.0
}

pub fn validate_waypoint(wp: &Waypoint) -> Result<(), ScenarioError> {
    if !valid_position(wp.position) {
        return Err(ScenarioError::InvalidWaypoint {
            id: wp.id.clone(),
            reason: "latitude/longitude out of range".into(),
        });
    }
    Ok(())
}

// ── Planner ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavMode {
    Direct,
    Tacking,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub origin_id: String,
    pub origin: LatLon,
    pub destination: Waypoint,
}

/// What the planner wants this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Guidance {
    pub heading_deg: f64,
    pub direct_bearing_deg: f64,
    pub mode: NavMode,
    /// A tack flip happened this tick
    pub tacked: bool,
    /// The active waypoint was reached this tick
    pub arrived: bool,
}

#[derive(Debug, Clone)]
pub struct Planner {
    plan: NavigationPlan,
    active: usize,
    leg: Leg,
    mode: NavMode,
    tack_side: f64,
    maneuver_until_s: f64,
    last_heading_deg: f64,
    complete: bool,
}

impl Planner {
    /// Assumes a validated, non-empty plan.
    pub fn new(plan: NavigationPlan) -> Self {
        let first = plan.waypoints[0].clone();
        let last_heading_deg = geo::bearing_deg(plan.start, first.position);
        let leg = Leg { origin_id: "START".into(), origin: plan.start, destination: first };
        Self {
            plan,
            active: 0,
            leg,
            mode: NavMode::Direct,
            tack_side: 1.0,
            maneuver_until_s: f64::NEG_INFINITY,
            last_heading_deg,
            complete: false,
        }
    }

    pub fn plan(&self) -> &NavigationPlan {
        &self.plan
    }

    pub fn leg(&self) -> &Leg {
        &self.leg
    }

    pub fn mode(&self) -> NavMode {
        self.mode
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Speed multiplier for time `t_s`: `tack_efficiency` inside a maneuver window.
    pub fn efficiency(&self, t_s: f64) -> f64 {
        if t_s < self.maneuver_until_s {
            self.plan.tack_efficiency
        } else {
            1.0
        }
    }

    pub fn maneuvering(&self, t_s: f64) -> bool {
        t_s < self.maneuver_until_s
    }

    /// Append a waypoint. A completed plan resumes toward it from the last
    /// waypoint reached.
    pub fn push_waypoint(&mut self, wp: Waypoint) {
        self.plan.waypoints.push(wp.clone());
        if self.complete {
            let reached = self.leg.destination.clone();
            self.active = self.plan.waypoints.len() - 1;
            self.leg = Leg { origin_id: reached.id, origin: reached.position, destination: wp };
            self.mode = NavMode::Direct;
            self.complete = false;
        }
    }

    fn arrive(&mut self) {
        let reached = self.leg.destination.clone();
        match self.plan.waypoints.get(self.active + 1).cloned() {
            Some(next) => {
                self.active += 1;
                self.leg = Leg { origin_id: reached.id, origin: reached.position, destination: next };
            }
            None => self.complete = true,
        }
        self.mode = NavMode::Direct;
    }

    /// Tack side with the larger angle off the wind; starboard offset on a tie.
    fn initial_side(&self, bearing: f64, wind_from_deg: f64) -> f64 {
        let w = self.plan.corridor_half_width_deg;
        let plus = angle_between(bearing + w, wind_from_deg);
        let minus = angle_between(bearing - w, wind_from_deg);
        if minus > plus { -1.0 } else { 1.0 }
    }

    /// Target heading for a vessel at `position` at time `t_s` with true wind
    /// from `wind_from_deg`.
    pub fn steer(&mut self, position: LatLon, t_s: f64, wind_from_deg: f64) -> Guidance {
        let mut arrived = false;
        while !self.complete
            && geo::distance_nm(position, self.leg.destination.position) <= self.plan.arrival_radius_nm
        {
            self.arrive();
            arrived = true;
        }

        let bearing = geo::bearing_deg(position, self.leg.destination.position);
        if self.complete {
            return Guidance {
                heading_deg: self.last_heading_deg,
                direct_bearing_deg: bearing,
                mode: self.mode,
                tacked: false,
                arrived,
            };
        }

        let to_wind = angle_between(bearing, wind_from_deg);
        match self.mode {
            NavMode::Direct if to_wind <= self.plan.min_tack_angle_deg => {
                self.mode = NavMode::Tacking;
                self.tack_side = self.initial_side(bearing, wind_from_deg);
            }
            NavMode::Tacking if to_wind > self.plan.min_tack_angle_deg + self.plan.hysteresis_deg => {
                self.mode = NavMode::Direct;
            }
            _ => {}
        }

        let mut tacked = false;
        let heading_deg = match self.mode {
            NavMode::Direct => bearing,
            NavMode::Tacking => {
                let xte = geo::cross_track_nm(self.leg.origin, self.leg.destination.position, position);
                let bound = self.plan.corridor_half_width_nm;
                if (self.tack_side > 0.0 && xte > bound) || (self.tack_side < 0.0 && xte < -bound) {
                    self.tack_side = -self.tack_side;
                    self.maneuver_until_s = t_s + self.plan.maneuver_window_s;
                    tacked = true;
                }
                normalize_deg(bearing + self.tack_side * self.plan.corridor_half_width_deg)
            }
        };

        self.last_heading_deg = heading_deg;
        Guidance { heading_deg, direct_bearing_deg: bearing, mode: self.mode, tacked, arrived }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::signed_deg;

    fn east_plan() -> NavigationPlan {
        NavigationPlan::new(LatLon::new(50.0, -1.0), vec![Waypoint::new("E1", 50.0, -0.8)])
    }

    #[test]
    fn boundary_angle_enters_tacking() {
        let mut p = Planner::new(east_plan());
        // Wind from 045, bearing 090: exactly the minimum tack angle
        let g = p.steer(LatLon::new(50.0, -1.0), 0.0, 45.0);
        assert_eq!(g.mode, NavMode::Tacking);
        assert!((g.direct_bearing_deg - 90.0).abs() < 1e-9);
        // Starts on the side further from the wind
        assert!((g.heading_deg - 105.0).abs() < 1e-9);
    }

    #[test]
    fn reaching_bearing_stays_direct() {
        let mut p = Planner::new(east_plan());
        let g = p.steer(LatLon::new(50.0, -1.0), 0.0, 0.0);
        assert_eq!(g.mode, NavMode::Direct);
        assert!((g.heading_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn flips_only_when_crossing_the_corridor() {
        let mut p = Planner::new(east_plan());
        let inside = LatLon::new(50.0 - 0.05 / 60.0, -0.95);
        let outside_right = LatLon::new(50.0 - 0.15 / 60.0, -0.9);
        let outside_left = LatLon::new(50.0 + 0.15 / 60.0, -0.85);

        let g = p.steer(inside, 0.0, 45.0);
        assert!(!g.tacked);
        assert!(!p.maneuvering(0.0));

        let g = p.steer(outside_right, 10.0, 45.0);
        assert!(g.tacked);
        assert!(signed_deg(g.heading_deg - g.direct_bearing_deg) < 0.0);
        assert!(p.maneuvering(12.0));
        assert_eq!(p.efficiency(12.0), 0.9);
        assert_eq!(p.efficiency(18.0), 1.0);

        // Still right of the corridor but now heading back: no chatter
        let g = p.steer(outside_right, 11.0, 45.0);
        assert!(!g.tacked);

        let g = p.steer(outside_left, 60.0, 45.0);
        assert!(g.tacked);
        assert!(signed_deg(g.heading_deg - g.direct_bearing_deg) > 0.0);
    }

    #[test]
    fn commanded_heading_stays_inside_corridor() {
        let mut p = Planner::new(east_plan());
        for i in 0..50 {
            let lat = 50.0 + ((i as f64) * 0.37).sin() * 0.3 / 60.0;
            let lon = -1.0 + i as f64 * 0.003;
            let g = p.steer(LatLon::new(lat, lon), i as f64, 45.0);
            if g.mode == NavMode::Tacking {
                let off = signed_deg(g.heading_deg - g.direct_bearing_deg).abs();
                assert!((off - 15.0).abs() < 1e-9, "offset {off}");
            }
        }
    }

    #[test]
    fn hysteresis_delays_return_to_direct() {
        let mut p = Planner::new(east_plan());
        p.steer(LatLon::new(50.0, -1.0), 0.0, 45.0);
        // Bearing now 48° off the wind: inside the 5° margin
        assert_eq!(p.steer(LatLon::new(50.0, -1.0), 1.0, 42.0).mode, NavMode::Tacking);
        assert_eq!(p.steer(LatLon::new(50.0, -1.0), 2.0, 30.0).mode, NavMode::Direct);
    }

    #[test]
    fn exhausting_waypoints_holds_heading() {
        let mut p = Planner::new(NavigationPlan::new(
            LatLon::new(50.0, -1.0),
            vec![Waypoint::new("A", 50.0, -0.99), Waypoint::new("B", 50.01, -0.99)],
        ));
        let g = p.steer(LatLon::new(50.0, -1.0), 0.0, 270.0);
        assert!((g.heading_deg - 90.0).abs() < 1e-9);

        let g = p.steer(LatLon::new(50.0, -0.99), 1.0, 270.0);
        assert!(g.arrived);
        assert_eq!(p.leg().destination.id, "B");
        assert!((g.heading_deg - 0.0).abs() < 1e-6 || (g.heading_deg - 360.0).abs() < 1e-6);

        let g = p.steer(LatLon::new(50.01, -0.99), 2.0, 270.0);
        assert!(g.arrived);
        assert!(p.is_complete());
        let held = g.heading_deg;
        let g = p.steer(LatLon::new(50.2, -0.5), 3.0, 270.0);
        assert_eq!(g.heading_deg, held);

        p.push_waypoint(Waypoint::new("C", 50.01, -0.97));
        assert!(!p.is_complete());
        assert_eq!(p.leg().origin_id, "B");
        assert_eq!(p.active_index(), 2);
    }

    #[test]
    fn validation_reasons() {
        let mut plan = east_plan();
        plan.waypoints.clear();
        assert_eq!(plan.validate(), Err(ScenarioError::EmptyPlan));

        let mut plan = east_plan();
        plan.tack_efficiency = 1.5;
        assert!(matches!(plan.validate(), Err(ScenarioError::InvalidPlan { field: "tack_efficiency", .. })));

        let mut plan = east_plan();
        plan.waypoints.push(Waypoint::new("bad", 123.0, 0.0));
        assert!(matches!(plan.validate(), Err(ScenarioError::InvalidWaypoint { .. })));
    }
}
