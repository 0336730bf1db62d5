//! scenarios.rs — Built-in vessel profile and scenario presets
//!
//! Scenarios are supplied fully formed in code. Each preset pairs the
//! cruiser profile with an environment timeline, a navigation plan and a
//! seabed model, and is selectable by name from the CLI, the config file or
//! the `/control` socket.

use std::sync::Arc;

use nmea_types::LatLon;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::engine::Scenario;
use crate::environment::{Breakpoint, CurrentSample, EnvironmentTimeline, WindSample};
use crate::navigation::{NavigationPlan, Waypoint};
use crate::performance::{KeelType, PolarTable, VesselProfile};
use crate::vessel::{FlatSeabed, ShelvingSeabed};

pub const PRESET_NAMES: [&str; 4] = ["beat_to_windward", "rising_tide", "coastal_passage", "gusty_reach"];

/// 35 ft fin-keel cruiser. Zero wind gives zero boat speed at every angle.
pub fn cruiser_profile() -> VesselProfile {
    VesselProfile {
        name: "Cruiser 35".into(),
        length_m: 10.7,
        beam_m: 3.5,
        draft_m: 1.9,
        displacement_kg: 6200.0,
        keel: KeelType::Fin,
        leeway_coefficient: KeelType::Fin.default_coefficient(),
        max_leeway_deg: 10.0,
        polar: PolarTable {
            angles_deg: vec![0.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0, 150.0, 180.0],
            speeds_kn: vec![0.0, 4.0, 8.0, 12.0, 16.0, 20.0, 25.0],
            stw_kn: vec![
                vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                vec![0.0, 0.5, 1.0, 1.5, 1.8, 2.0, 2.0],
                vec![0.0, 1.8, 3.0, 3.8, 4.2, 4.4, 4.4],
                vec![0.0, 3.2, 5.0, 5.9, 6.3, 6.5, 6.5],
                vec![0.0, 3.8, 5.8, 6.6, 7.0, 7.2, 7.3],
                vec![0.0, 4.2, 6.3, 7.1, 7.5, 7.8, 8.0],
                vec![0.0, 3.9, 6.0, 7.0, 7.6, 8.0, 8.3],
                vec![0.0, 3.0, 5.0, 6.2, 7.0, 7.5, 7.9],
                vec![0.0, 2.4, 4.2, 5.4, 6.3, 6.9, 7.4],
            ],
        },
    }
}

/// Look up a preset by name. `seed` only affects `gusty_reach`.
pub fn preset(name: &str, seed: u64) -> Option<Scenario> {
    match name {
        "beat_to_windward" => Some(beat_to_windward()),
        "rising_tide" => Some(rising_tide()),
        "coastal_passage" => Some(coastal_passage()),
        "gusty_reach" => Some(gusty_reach(seed)),
        _ => None,
    }
}

/// 15 kn from 045 with the mark dead east: the direct course sits on the
/// no-go boundary, so the planner tacks up the corridor.
pub fn beat_to_windward() -> Scenario {
    let start = LatLon::new(50.0, -1.0);
    Scenario {
        name: "beat_to_windward".into(),
        profile: cruiser_profile(),
        environment: EnvironmentTimeline::steady(WindSample { speed_kn: 15.0, direction_deg: 45.0 }, 0.0),
        plan: NavigationPlan::new(start, vec![Waypoint::new("WINDWARD", 50.0, -0.8)]),
        seabed: Arc::new(FlatSeabed { depth_m: 20.0 }),
    }
}

/// Becalmed over a flat 20 m bottom while the tide rises 2.1 → 3.8 m in an hour.
pub fn rising_tide() -> Scenario {
    let start = LatLon::new(50.0, -1.0);
    Scenario {
        name: "rising_tide".into(),
        profile: cruiser_profile(),
        environment: EnvironmentTimeline {
            wind: vec![Breakpoint::new(0.0, WindSample::default())],
            current: vec![],
            tide: vec![Breakpoint::new(0.0, 2.1), Breakpoint::new(3600.0, 3.8)],
        },
        plan: NavigationPlan::new(start, vec![Waypoint::new("MOORING", 50.05, -1.0)]),
        seabed: Arc::new(FlatSeabed { depth_m: 20.0 }),
    }
}

/// Three-leg reach along a coast with a turning tidal stream and a bottom
/// that shoals toward the shore.
pub fn coastal_passage() -> Scenario {
    let start = LatLon::new(50.70, -1.50);
    let mut plan = NavigationPlan::new(
        start,
        vec![
            Waypoint::new("NAB", 50.70, -1.30),
            Waypoint::new("OWERS", 50.62, -1.18),
            Waypoint::new("SELSEY", 50.58, -0.98),
        ],
    );
    plan.arrival_radius_nm = 0.1;

    Scenario {
        name: "coastal_passage".into(),
        profile: cruiser_profile(),
        environment: EnvironmentTimeline {
            wind: vec![
                Breakpoint::new(0.0, WindSample { speed_kn: 14.0, direction_deg: 200.0 }),
                Breakpoint::new(7200.0, WindSample { speed_kn: 17.0, direction_deg: 215.0 }),
                Breakpoint::new(14400.0, WindSample { speed_kn: 12.0, direction_deg: 230.0 }),
            ],
            current: vec![
                Breakpoint::new(0.0, CurrentSample { speed_kn: 1.2, set_deg: 80.0 }),
                Breakpoint::new(10800.0, CurrentSample { speed_kn: 0.3, set_deg: 95.0 }),
                Breakpoint::new(21600.0, CurrentSample { speed_kn: 1.0, set_deg: 260.0 }),
            ],
            tide: vec![Breakpoint::new(0.0, 1.0), Breakpoint::new(21600.0, 4.2)],
        },
        plan,
        seabed: Arc::new(ShelvingSeabed {
            origin: start,
            depth_at_origin_m: 30.0,
            shoaling_toward_deg: 0.0,
            gradient_m_per_nm: 2.0,
            min_depth_m: 3.0,
        }),
    }
}

/// Beam reach south in a gusty westerly. The wind series is drawn once from
/// a seeded generator, so the same seed always yields the same timeline.
pub fn gusty_reach(seed: u64) -> Scenario {
    const STEP_S: f64 = 30.0;
    const SPAN_S: f64 = 7200.0;

    let mut rng = StdRng::seed_from_u64(seed);
    let speed_gust = Normal::new(0.0, 2.5);
    let shift = Normal::new(0.0, 8.0);
    let mut wind = Vec::new();
    let mut t = 0.0;
    while t <= SPAN_S {
        let dv: f64 = speed_gust.as_ref().map_or(0.0, |n| n.sample(&mut rng));
        let dd = shift.as_ref().map_or(0.0, |n| n.sample(&mut rng));
        wind.push(Breakpoint::new(
            t,
            WindSample { speed_kn: (12.0 + dv).max(0.0), direction_deg: 270.0 + dd },
        ));
        t += STEP_S;
    }

    let start = LatLon::new(50.0, -1.0);
    Scenario {
        name: "gusty_reach".into(),
        profile: cruiser_profile(),
        environment: EnvironmentTimeline { wind, current: vec![], tide: vec![Breakpoint::new(0.0, 1.5)] },
        plan: NavigationPlan::new(start, vec![Waypoint::new("SOUTH", 49.8, -1.0)]),
        seabed: Arc::new(FlatSeabed { depth_m: 35.0 }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_is_valid() {
        for name in PRESET_NAMES {
            let s = preset(name, 7).unwrap();
            assert_eq!(s.name, name);
            s.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
        }
        assert!(preset("doldrums", 0).is_none());
    }

    #[test]
    fn cruiser_polar_is_zero_in_zero_wind() {
        let p = cruiser_profile();
        for awa in [0.0, 45.0, 90.0, 135.0, 180.0] {
            assert_eq!(p.polar.lookup(awa, 0.0), 0.0);
        }
    }

    #[test]
    fn gusts_are_seeded() {
        let a = gusty_reach(42).environment;
        let b = gusty_reach(42).environment;
        let c = gusty_reach(43).environment;
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.wind.len(), 241);
        assert!(a.wind.iter().all(|bp| bp.value.speed_kn >= 0.0));
    }
}
