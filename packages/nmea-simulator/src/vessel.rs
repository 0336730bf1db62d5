//! vessel.rs — Vessel state engine
//!
//! One call to [`advance`] turns the previous snapshot into the next:
//! environment → planner heading → apparent wind → polar STW → leeway →
//! ground velocity (water + current) → position → leg geometry → depth.
//! Pure math: no clocks, no randomness, no I/O. The same inputs always give
//! the same state.

use nmea_types::LatLon;
use serde::Serialize;

use crate::environment::{Conditions, EnvironmentTimeline};
use crate::geo::{self, normalize_deg, signed_deg, Vec2};
use crate::navigation::{NavMode, Planner};
use crate::performance::VesselProfile;

// ── Seabed ────────────────────────────────────────────────────────────────────

/// Charted depth (metres below chart datum) at a position.
pub trait Bathymetry: Send + Sync {
    fn depth_at(&self, position: LatLon) -> f64;
}

#[derive(Debug, Clone, Copy)]
pub struct FlatSeabed {
    pub depth_m: f64,
}

impl Bathymetry for FlatSeabed {
    fn depth_at(&self, _position: LatLon) -> f64 {
        self.depth_m
    }
}

/// Seabed that shoals linearly toward a bearing, never shallower than `min_depth_m`.
#[derive(Debug, Clone, Copy)]
pub struct ShelvingSeabed {
    pub origin: LatLon,
    pub depth_at_origin_m: f64,
    /// Direction in which the bottom gets shallower
    pub shoaling_toward_deg: f64,
    pub gradient_m_per_nm: f64,
    pub min_depth_m: f64,
}

impl Bathymetry for ShelvingSeabed {
    fn depth_at(&self, position: LatLon) -> f64 {
        let along = geo::offset_nm(self.origin, position).dot(&Vec2::from_polar(1.0, self.shoaling_toward_deg));
        (self.depth_at_origin_m - along * self.gradient_m_per_nm).max(self.min_depth_m)
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegSnapshot {
    pub origin_id: String,
    pub destination_id: String,
    pub destination: LatLon,
}

/// Navigational state at one tick. Angles in degrees true unless noted,
/// speeds in knots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationState {
    pub tick: u64,
    /// Simulated seconds since scenario start
    pub time_s: f64,
    pub position: LatLon,
    pub heading_deg: f64,
    pub stw_kn: f64,
    /// Positive to starboard
    pub leeway_deg: f64,
    /// Course through water (heading + leeway)
    pub ctw_deg: f64,
    pub sog_kn: f64,
    pub cog_deg: f64,
    pub aws_kn: f64,
    /// Relative to the bow, (-180, 180], starboard positive
    pub awa_deg: f64,
    pub tws_kn: f64,
    /// Direction the wind blows from
    pub twd_deg: f64,
    /// Relative to the bow, (-180, 180], starboard positive
    pub twa_deg: f64,
    pub current_kn: f64,
    pub current_set_deg: f64,
    pub tide_m: f64,
    /// Water under the keel: charted depth − draft + tide
    pub depth_m: f64,
    /// Positive right of track
    pub xte_nm: f64,
    /// Ground speed component along the active leg
    pub vmg_kn: f64,
    pub bearing_to_waypoint_deg: f64,
    pub distance_to_waypoint_nm: f64,
    pub leg: LegSnapshot,
    pub active_waypoint: usize,
    pub nav_mode: NavMode,
    pub tacked: bool,
    pub maneuvering: bool,
    pub plan_complete: bool,
}

/// Apparent wind (speed, signed angle off the bow) felt by a hull moving at
/// `boat` through a true wind blowing from `twd_deg` at `tws_kn`.
pub fn apparent_wind(tws_kn: f64, twd_deg: f64, boat: Vec2, heading_deg: f64) -> (f64, f64) {
    let air = Vec2::from_polar(tws_kn, twd_deg + 180.0);
    let relative = air - boat;
    let aws = relative.magnitude();
    if aws < 1e-9 {
        return (0.0, 0.0);
    }
    let from = relative.bearing_deg() + 180.0;
    (aws, signed_deg(from - heading_deg))
}

fn leg_snapshot(planner: &Planner) -> LegSnapshot {
    let leg = planner.leg();
    LegSnapshot {
        origin_id: leg.origin_id.clone(),
        destination_id: leg.destination.id.clone(),
        destination: leg.destination.position,
    }
}

/// Leg-relative fields: (xte, vmg, bearing, distance).
fn leg_geometry(planner: &Planner, position: LatLon, ground: Vec2) -> (f64, f64, f64, f64) {
    let leg = planner.leg();
    let dest = leg.destination.position;
    let bearing = geo::bearing_deg(position, dest);
    let distance = geo::distance_nm(position, dest);
    if planner.is_complete() {
        return (0.0, 0.0, bearing, distance);
    }
    let xte = geo::cross_track_nm(leg.origin, dest, position);
    let vmg = geo::track_unit(leg.origin, dest).map_or(0.0, |u| ground.dot(&u));
    (xte, vmg, bearing, distance)
}

/// State at t = 0: at the plan start, pointing at the first waypoint, stopped.
pub fn initial_state(
    env: &EnvironmentTimeline,
    profile: &VesselProfile,
    planner: &Planner,
    seabed: &dyn Bathymetry,
) -> SimulationState {
    let Conditions { wind, current, tide_m } = env.at(0.0);
    let position = planner.plan().start;
    let heading_deg = geo::bearing_deg(position, planner.leg().destination.position);
    let (aws_kn, awa_deg) = apparent_wind(wind.speed_kn, wind.direction_deg, Vec2::zero(), heading_deg);
    let ground = Vec2::from_polar(current.speed_kn, current.set_deg);
    let (xte_nm, vmg_kn, bearing, distance) = leg_geometry(planner, position, ground);
    SimulationState {
        tick: 0,
        time_s: 0.0,
        position,
        heading_deg,
        stw_kn: 0.0,
        leeway_deg: 0.0,
        ctw_deg: heading_deg,
        sog_kn: ground.magnitude(),
        cog_deg: if ground.magnitude() > 1e-9 { ground.bearing_deg() } else { heading_deg },
        aws_kn,
        awa_deg,
        tws_kn: wind.speed_kn,
        twd_deg: normalize_deg(wind.direction_deg),
        twa_deg: signed_deg(wind.direction_deg - heading_deg),
        current_kn: current.speed_kn,
        current_set_deg: normalize_deg(current.set_deg),
        tide_m,
        depth_m: seabed.depth_at(position) - profile.draft_m + tide_m,
        xte_nm,
        vmg_kn,
        bearing_to_waypoint_deg: bearing,
        distance_to_waypoint_nm: distance,
        leg: leg_snapshot(planner),
        active_waypoint: planner.active_index(),
        nav_mode: planner.mode(),
        tacked: false,
        maneuvering: false,
        plan_complete: planner.is_complete(),
    }
}

/// Advance `prev` by `dt_s` simulated seconds.
pub fn advance(
    prev: &SimulationState,
    dt_s: f64,
    env: &EnvironmentTimeline,
    profile: &VesselProfile,
    planner: &mut Planner,
    seabed: &dyn Bathymetry,
) -> SimulationState {
    // 1. Environment at the new time
    let time_s = prev.time_s + dt_s;
    let Conditions { wind, current, tide_m } = env.at(time_s);

    // 2. Target heading
    let guidance = planner.steer(prev.position, time_s, wind.direction_deg);
    let heading_deg = normalize_deg(guidance.heading_deg);

    // 3. Apparent wind from true wind and last tick's water velocity
    let boat = Vec2::from_polar(prev.stw_kn, prev.heading_deg);
    let (aws_kn, awa_deg) = apparent_wind(wind.speed_kn, wind.direction_deg, boat, heading_deg);

    // 4. Polar speed, reduced inside a tack maneuver window
    let stw_kn = profile.polar.lookup(awa_deg, aws_kn) * planner.efficiency(time_s);

    // 5. Leeway
    let leeway_deg = profile.leeway_deg(aws_kn, awa_deg);
    let ctw_deg = normalize_deg(heading_deg + leeway_deg);

    // 6. Over ground
    let water = Vec2::from_polar(stw_kn, ctw_deg);
    let ground = water + Vec2::from_polar(current.speed_kn, current.set_deg);
    let sog_kn = ground.magnitude();
    let cog_deg = if sog_kn > 1e-9 { ground.bearing_deg() } else { ctw_deg };

    // 7. Position
    let position = geo::displace(prev.position, ground * (dt_s / 3600.0));

    // 8. Leg geometry
    let (xte_nm, vmg_kn, bearing, distance) = leg_geometry(planner, position, ground);

    // 9. Depth
    let depth_m = seabed.depth_at(position) - profile.draft_m + tide_m;

    SimulationState {
        tick: prev.tick + 1,
        time_s,
        position,
        heading_deg,
        stw_kn,
        leeway_deg,
        ctw_deg,
        sog_kn,
        cog_deg,
        aws_kn,
        awa_deg,
        tws_kn: wind.speed_kn,
        twd_deg: normalize_deg(wind.direction_deg),
        twa_deg: signed_deg(wind.direction_deg - heading_deg),
        current_kn: current.speed_kn,
        current_set_deg: normalize_deg(current.set_deg),
        tide_m,
        depth_m,
        xte_nm,
        vmg_kn,
        bearing_to_waypoint_deg: bearing,
        distance_to_waypoint_nm: distance,
        leg: leg_snapshot(planner),
        active_waypoint: planner.active_index(),
        nav_mode: guidance.mode,
        tacked: guidance.tacked,
        maneuvering: planner.maneuvering(time_s),
        plan_complete: planner.is_complete(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Breakpoint, CurrentSample, WindSample};
    use crate::navigation::{NavigationPlan, Waypoint};
    use crate::scenarios;

    fn run(env: &EnvironmentTimeline, plan: NavigationPlan, ticks: usize, dt: f64) -> Vec<SimulationState> {
        let profile = scenarios::cruiser_profile();
        let seabed = FlatSeabed { depth_m: 20.0 };
        let mut planner = Planner::new(plan);
        let mut state = initial_state(env, &profile, &planner, &seabed);
        let mut out = Vec::with_capacity(ticks);
        for _ in 0..ticks {
            state = advance(&state, dt, env, &profile, &mut planner, &seabed);
            out.push(state.clone());
        }
        out
    }

    #[test]
    fn zero_wind_apparent_is_boat_speed() {
        let (aws, awa) = apparent_wind(0.0, 0.0, Vec2::from_polar(6.0, 90.0), 90.0);
        assert!((aws - 6.0).abs() < 1e-9);
        assert!(awa.abs() < 1e-9);
    }

    #[test]
    fn head_to_wind_adds_boat_speed() {
        let (aws, awa) = apparent_wind(10.0, 0.0, Vec2::from_polar(5.0, 0.0), 0.0);
        assert!((aws - 15.0).abs() < 1e-9);
        assert!(awa.abs() < 1e-9);

        // Beam wind from starboard moves forward as boat speed builds
        let (_, awa) = apparent_wind(10.0, 90.0, Vec2::from_polar(5.0, 0.0), 0.0);
        assert!(awa > 0.0 && awa < 90.0);
    }

    #[test]
    fn ground_vector_is_water_plus_current() {
        let start = LatLon::new(50.0, -1.0);
        for i in 0..12 {
            let set = i as f64 * 31.0;
            let wind_from = (i as f64 * 47.0 + 10.0) % 360.0;
            let env = EnvironmentTimeline {
                wind: vec![Breakpoint::new(0.0, WindSample { speed_kn: 8.0 + i as f64, direction_deg: wind_from })],
                current: vec![Breakpoint::new(0.0, CurrentSample { speed_kn: 0.3 * i as f64, set_deg: set })],
                tide: vec![],
            };
            let wp = geo::displace(start, Vec2::from_polar(5.0, i as f64 * 29.0));
            let plan = NavigationPlan::new(start, vec![Waypoint::new("W", wp.lat, wp.lon)]);
            for s in run(&env, plan, 20, 1.0) {
                let water = Vec2::from_polar(s.stw_kn, s.ctw_deg);
                let current = Vec2::from_polar(s.current_kn, s.current_set_deg);
                let ground = Vec2::from_polar(s.sog_kn, s.cog_deg);
                let diff = ground - (water + current);
                assert!(diff.magnitude() < 1e-9, "combination {i}: {diff:?}");
                assert!((signed_deg(s.ctw_deg - s.heading_deg) - s.leeway_deg).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn depth_follows_tide() {
        let env = EnvironmentTimeline {
            wind: vec![Breakpoint::new(0.0, WindSample::default())],
            current: vec![],
            tide: vec![Breakpoint::new(0.0, 2.1), Breakpoint::new(3600.0, 3.8)],
        };
        let plan = NavigationPlan::new(LatLon::new(50.0, -1.0), vec![Waypoint::new("W", 50.1, -1.0)]);
        let states = run(&env, plan, 3600, 1.0);
        let first = &states[0];
        let last = states.last().unwrap();
        // Becalmed: the hull never moves, so only the tide changes the sounding
        assert_eq!(first.position, last.position);
        assert!((last.time_s - 3600.0).abs() < 1e-6);
        let expected = (3.8 - 2.1) * (last.time_s - first.time_s) / 3600.0;
        assert!((last.depth_m - first.depth_m - expected).abs() < 1e-9);
        assert!((last.depth_m - (20.0 - 1.9 + 3.8)).abs() < 1e-9);
    }

    #[test]
    fn shelving_seabed_shoals_toward_bearing() {
        let origin = LatLon::new(50.0, -1.0);
        let bed = ShelvingSeabed {
            origin,
            depth_at_origin_m: 30.0,
            shoaling_toward_deg: 0.0,
            gradient_m_per_nm: 2.0,
            min_depth_m: 3.0,
        };
        assert!((bed.depth_at(LatLon::new(50.0 + 5.0 / 60.0, -1.0)) - 20.0).abs() < 1e-9);
        assert_eq!(bed.depth_at(LatLon::new(51.0, -1.0)), 3.0);
    }
}
