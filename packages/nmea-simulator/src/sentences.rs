//! sentences.rs — SimulationState → NMEA sentences
//!
//! Every sentence built for one emission cycle reads the same
//! `SimulationState`, so position, speed, wind and depth always agree.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use nmea_types::pgn::{
    DepthPayload, SpeedPayload, WindDataPayload, WindPgnReference, PGN_SPEED, PGN_WATER_DEPTH, PGN_WIND_DATA,
};
use nmea_types::sentence::*;
use nmea_types::PgnCarrier;
use serde::{Deserialize, Serialize};

use crate::geo::{normalize_deg, KMH_PER_KNOT, MPS_PER_KNOT};
use crate::vessel::SimulationState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceKind {
    Rmc,
    Gga,
    Vtg,
    Vhw,
    Hdt,
    Hdg,
    MwvApparent,
    MwvTrue,
    Mwd,
    Dpt,
    Xte,
    Rmb,
    PgnWind,
    PgnSpeed,
    PgnDepth,
}

impl SentenceKind {
    pub const ALL: [SentenceKind; 15] = [
        Self::Rmc,
        Self::Gga,
        Self::Vtg,
        Self::Vhw,
        Self::Hdt,
        Self::Hdg,
        Self::MwvApparent,
        Self::MwvTrue,
        Self::Mwd,
        Self::Dpt,
        Self::Xte,
        Self::Rmb,
        Self::PgnWind,
        Self::PgnSpeed,
        Self::PgnDepth,
    ];

    /// Key used in the `[sentences]` config table.
    pub fn key(self) -> &'static str {
        match self {
            Self::Rmc => "rmc",
            Self::Gga => "gga",
            Self::Vtg => "vtg",
            Self::Vhw => "vhw",
            Self::Hdt => "hdt",
            Self::Hdg => "hdg",
            Self::MwvApparent => "mwv_apparent",
            Self::MwvTrue => "mwv_true",
            Self::Mwd => "mwd",
            Self::Dpt => "dpt",
            Self::Xte => "xte",
            Self::Rmb => "rmb",
            Self::PgnWind => "pgn_wind",
            Self::PgnSpeed => "pgn_speed",
            Self::PgnDepth => "pgn_depth",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Type tag used in framed envelopes.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Rmc => "RMC",
            Self::Gga => "GGA",
            Self::Vtg => "VTG",
            Self::Vhw => "VHW",
            Self::Hdt => "HDT",
            Self::Hdg => "HDG",
            Self::MwvApparent | Self::MwvTrue => "MWV",
            Self::Mwd => "MWD",
            Self::Dpt => "DPT",
            Self::Xte => "XTE",
            Self::Rmb => "RMB",
            Self::PgnWind | Self::PgnSpeed | Self::PgnDepth => "PCDIN",
        }
    }

    pub fn talker(self) -> &'static str {
        match self {
            Self::Rmc | Self::Gga | Self::Vtg | Self::Xte | Self::Rmb => "GP",
            Self::Hdt | Self::Hdg => "HE",
            Self::Vhw => "VW",
            Self::MwvApparent | Self::MwvTrue | Self::Mwd => "WI",
            Self::Dpt => "SD",
            Self::PgnWind | Self::PgnSpeed | Self::PgnDepth => "P",
        }
    }

    pub fn default_interval(self) -> Duration {
        let ms = match self {
            Self::Rmc | Self::Hdt => 200,
            Self::MwvApparent | Self::MwvTrue | Self::PgnWind => 333,
            Self::Vtg | Self::Vhw | Self::Hdg | Self::Dpt | Self::PgnSpeed => 500,
            Self::Gga | Self::Mwd | Self::Xte | Self::Rmb | Self::PgnDepth => 1000,
        };
        Duration::from_millis(ms)
    }
}

/// Settings that turn a state into sentence fields but are not part of the state.
#[derive(Debug, Clone)]
pub struct EncoderContext {
    /// Simulated wall clock at t = 0
    pub epoch: DateTime<Utc>,
    /// East positive
    pub magnetic_variation_deg: f64,
    /// Transducer depth below the waterline (reported as DPT offset)
    pub transducer_offset_m: f64,
    pub arrival_radius_nm: f64,
    /// NMEA 2000 source address for PGN carriers
    pub pgn_source: u8,
}

impl EncoderContext {
    pub fn clock(&self, state: &SimulationState) -> DateTime<Utc> {
        self.epoch + chrono::Duration::milliseconds((state.time_s * 1000.0).round() as i64)
    }

    pub fn timestamp_ms(&self, state: &SimulationState) -> u64 {
        self.clock(state).timestamp_millis().max(0) as u64
    }

    fn magnetic(&self, true_deg: f64) -> f64 {
        normalize_deg(true_deg - self.magnetic_variation_deg)
    }
}

/// One encoded sentence, ready for every transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundSentence {
    pub kind: SentenceKind,
    /// Full wire text including CR/LF
    pub text: Bytes,
    /// Simulated clock, ms since the Unix epoch
    pub timestamp_ms: u64,
    pub tick: u64,
}

impl OutboundSentence {
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.text).unwrap_or_default()
    }
}

// ── Per-sentence builders ─────────────────────────────────────────────────────

pub fn rmc(s: &SimulationState, ctx: &EncoderContext) -> Rmc {
    let clock = ctx.clock(s);
    Rmc {
        time: clock.time(),
        active: true,
        position: s.position,
        sog_kn: s.sog_kn,
        cog_deg: s.cog_deg,
        date: clock.date_naive(),
        variation_deg: Some(ctx.magnetic_variation_deg),
    }
}

pub fn gga(s: &SimulationState, ctx: &EncoderContext) -> Gga {
    Gga {
        time: ctx.clock(s).time(),
        position: s.position,
        fix_quality: 1,
        satellites: 9,
        hdop: 0.9,
        altitude_m: 0.0,
    }
}

pub fn vtg(s: &SimulationState, ctx: &EncoderContext) -> Vtg {
    Vtg {
        cog_true_deg: s.cog_deg,
        cog_mag_deg: Some(ctx.magnetic(s.cog_deg)),
        sog_kn: s.sog_kn,
        sog_kmh: s.sog_kn * KMH_PER_KNOT,
    }
}

pub fn vhw(s: &SimulationState, ctx: &EncoderContext) -> Vhw {
    Vhw {
        heading_true_deg: Some(s.heading_deg),
        heading_mag_deg: Some(ctx.magnetic(s.heading_deg)),
        stw_kn: s.stw_kn,
        stw_kmh: s.stw_kn * KMH_PER_KNOT,
    }
}

pub fn hdt(s: &SimulationState) -> Hdt {
    Hdt { heading_deg: s.heading_deg }
}

pub fn hdg(s: &SimulationState, ctx: &EncoderContext) -> Hdg {
    Hdg {
        heading_mag_deg: ctx.magnetic(s.heading_deg),
        deviation_deg: None,
        variation_deg: Some(ctx.magnetic_variation_deg),
    }
}

pub fn mwv_apparent(s: &SimulationState) -> Mwv {
    Mwv {
        angle_deg: normalize_deg(s.awa_deg),
        reference: WindReference::Relative,
        speed: s.aws_kn,
        unit: SpeedUnit::Knots,
        valid: true,
    }
}

pub fn mwv_true(s: &SimulationState) -> Mwv {
    Mwv {
        angle_deg: normalize_deg(s.twa_deg),
        reference: WindReference::True,
        speed: s.tws_kn,
        unit: SpeedUnit::Knots,
        valid: true,
    }
}

pub fn mwd(s: &SimulationState, ctx: &EncoderContext) -> Mwd {
    Mwd {
        direction_true_deg: s.twd_deg,
        direction_mag_deg: Some(ctx.magnetic(s.twd_deg)),
        speed_kn: s.tws_kn,
        speed_mps: s.tws_kn * MPS_PER_KNOT,
    }
}

pub fn dpt(s: &SimulationState, ctx: &EncoderContext) -> Dpt {
    Dpt {
        depth_m: s.depth_m.max(0.0),
        offset_m: ctx.transducer_offset_m,
        max_range_m: None,
    }
}

pub fn xte(s: &SimulationState) -> Xte {
    Xte::from_signed(!s.plan_complete, s.xte_nm)
}

pub fn rmb(s: &SimulationState, ctx: &EncoderContext) -> Rmb {
    Rmb {
        valid: !s.plan_complete,
        xte_nm: s.xte_nm.abs(),
        steer: Steer::from_cross_track(s.xte_nm),
        origin_id: s.leg.origin_id.clone(),
        destination_id: s.leg.destination_id.clone(),
        destination: s.leg.destination,
        range_nm: s.distance_to_waypoint_nm,
        bearing_deg: s.bearing_to_waypoint_deg,
        closing_kn: s.vmg_kn,
        arrived: s.plan_complete || s.distance_to_waypoint_nm <= ctx.arrival_radius_nm,
    }
}

fn carrier<T: bytemuck::Pod>(pgn: u32, s: &SimulationState, ctx: &EncoderContext, payload: &T) -> PgnCarrier {
    PgnCarrier {
        pgn,
        timestamp_ms: ((s.time_s * 1000.0).round() as u64 & u32::MAX as u64) as u32,
        source: ctx.pgn_source,
        data: bytemuck::bytes_of(payload).to_vec(),
    }
}

fn sid(s: &SimulationState) -> u8 {
    (s.tick % 253) as u8
}

pub fn pgn_wind(s: &SimulationState, ctx: &EncoderContext) -> PgnCarrier {
    let payload = WindDataPayload::new(
        sid(s),
        s.aws_kn * MPS_PER_KNOT,
        normalize_deg(s.awa_deg).to_radians(),
        WindPgnReference::Apparent,
    );
    carrier(PGN_WIND_DATA, s, ctx, &payload)
}

pub fn pgn_speed(s: &SimulationState, ctx: &EncoderContext) -> PgnCarrier {
    let payload = SpeedPayload::new(sid(s), s.stw_kn * MPS_PER_KNOT, s.sog_kn * MPS_PER_KNOT);
    carrier(PGN_SPEED, s, ctx, &payload)
}

pub fn pgn_depth(s: &SimulationState, ctx: &EncoderContext) -> PgnCarrier {
    let payload = DepthPayload::new(sid(s), s.depth_m.max(0.0), ctx.transducer_offset_m);
    carrier(PGN_WATER_DEPTH, s, ctx, &payload)
}

/// Typed sentence for `kind` drawn from `state`.
pub fn build(kind: SentenceKind, state: &SimulationState, ctx: &EncoderContext) -> NmeaSentence {
    let body = match kind {
        SentenceKind::Rmc => Sentence::Rmc(rmc(state, ctx)),
        SentenceKind::Gga => Sentence::Gga(gga(state, ctx)),
        SentenceKind::Vtg => Sentence::Vtg(vtg(state, ctx)),
        SentenceKind::Vhw => Sentence::Vhw(vhw(state, ctx)),
        SentenceKind::Hdt => Sentence::Hdt(hdt(state)),
        SentenceKind::Hdg => Sentence::Hdg(hdg(state, ctx)),
        SentenceKind::MwvApparent => Sentence::Mwv(mwv_apparent(state)),
        SentenceKind::MwvTrue => Sentence::Mwv(mwv_true(state)),
        SentenceKind::Mwd => Sentence::Mwd(mwd(state, ctx)),
        SentenceKind::Dpt => Sentence::Dpt(dpt(state, ctx)),
        SentenceKind::Xte => Sentence::Xte(xte(state)),
        SentenceKind::Rmb => Sentence::Rmb(rmb(state, ctx)),
        SentenceKind::PgnWind => Sentence::Pgn(pgn_wind(state, ctx)),
        SentenceKind::PgnSpeed => Sentence::Pgn(pgn_speed(state, ctx)),
        SentenceKind::PgnDepth => Sentence::Pgn(pgn_depth(state, ctx)),
    };
    NmeaSentence::new(kind.talker(), body)
}

pub fn encode(kind: SentenceKind, state: &SimulationState, ctx: &EncoderContext) -> OutboundSentence {
    OutboundSentence {
        kind,
        text: Bytes::from(build(kind, state, ctx).encode()),
        timestamp_ms: ctx.timestamp_ms(state),
        tick: state.tick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::NavMode;
    use crate::vessel::LegSnapshot;
    use nmea_types::{checksum, decode, LatLon, PgnPayload};

    fn ctx() -> EncoderContext {
        EncoderContext {
            epoch: "2024-06-01T08:00:00Z".parse().unwrap(),
            magnetic_variation_deg: -2.0,
            transducer_offset_m: 1.9,
            arrival_radius_nm: 0.05,
            pgn_source: 1,
        }
    }

    fn state() -> SimulationState {
        SimulationState {
            tick: 42,
            time_s: 90.5,
            position: LatLon::new(50.762345, -1.298765),
            heading_deg: 104.6,
            stw_kn: 6.23,
            leeway_deg: -3.1,
            ctw_deg: 101.5,
            sog_kn: 6.81,
            cog_deg: 97.4,
            aws_kn: 18.44,
            awa_deg: -38.2,
            tws_kn: 15.0,
            twd_deg: 45.0,
            twa_deg: -59.6,
            current_kn: 0.8,
            current_set_deg: 70.0,
            tide_m: 2.5,
            depth_m: 14.37,
            xte_nm: -0.042,
            vmg_kn: 6.1,
            bearing_to_waypoint_deg: 89.7,
            distance_to_waypoint_nm: 3.21,
            leg: LegSnapshot {
                origin_id: "START".into(),
                destination_id: "E1".into(),
                destination: LatLon::new(50.76, -1.2),
            },
            active_waypoint: 0,
            nav_mode: NavMode::Tacking,
            tacked: false,
            maneuvering: false,
            plan_complete: false,
        }
    }

    fn decoded(kind: SentenceKind) -> Sentence {
        let out = encode(kind, &state(), &ctx());
        decode(out.as_str()).unwrap().sentence
    }

    #[test]
    fn every_kind_has_a_valid_checksum() {
        for kind in SentenceKind::ALL {
            let out = encode(kind, &state(), &ctx());
            let text = out.as_str();
            assert!(text.ends_with("\r\n"), "{kind:?}");
            let (_, payload) = checksum::verify(text.trim_end()).unwrap();
            let transmitted = u8::from_str_radix(&text.trim_end()[text.trim_end().len() - 2..], 16).unwrap();
            assert_eq!(checksum::checksum(payload), transmitted);
        }
    }

    #[test]
    fn position_round_trips_within_tolerance() {
        let Sentence::Rmc(rmc) = decoded(SentenceKind::Rmc) else { panic!("not RMC") };
        assert!((rmc.position.lat - 50.762345).abs() < 0.01);
        assert!((rmc.position.lon + 1.298765).abs() < 0.01);
        assert!((rmc.sog_kn - 6.81).abs() <= 0.1);
        assert!((rmc.cog_deg - 97.4).abs() <= 0.1);
        assert_eq!(rmc.time.to_string(), "08:01:30.500");
    }

    #[test]
    fn wind_sentences_agree_with_state() {
        let Sentence::Mwv(app) = decoded(SentenceKind::MwvApparent) else { panic!("not MWV") };
        assert_eq!(app.reference, WindReference::Relative);
        assert!((app.signed_angle_deg() + 38.2).abs() <= 0.1);
        assert!((app.speed_kn() - 18.44).abs() <= 0.1);

        let Sentence::Mwv(tw) = decoded(SentenceKind::MwvTrue) else { panic!("not MWV") };
        assert_eq!(tw.reference, WindReference::True);
        assert!((tw.speed - 15.0).abs() <= 0.1);

        let Sentence::Pgn(c) = decoded(SentenceKind::PgnWind) else { panic!("not PCDIN") };
        let PgnPayload::Wind(w) = c.payload().unwrap() else { panic!("not wind") };
        assert!((w.speed_mps() / MPS_PER_KNOT - 18.44).abs() < 0.05);
        assert!((w.angle_rad().to_degrees() - (360.0 - 38.2)).abs() < 0.01);
    }

    #[test]
    fn magnetic_fields_apply_variation() {
        let Sentence::Hdg(h) = decoded(SentenceKind::Hdg) else { panic!("not HDG") };
        assert!((h.heading_mag_deg - 106.6).abs() <= 0.1);
        assert_eq!(h.variation_deg, Some(-2.0));
    }

    #[test]
    fn depth_and_cross_track() {
        let Sentence::Dpt(d) = decoded(SentenceKind::Dpt) else { panic!("not DPT") };
        assert!((d.depth_m - 14.37).abs() < 0.01);
        assert!((d.offset_m - 1.9).abs() < 0.01);

        let Sentence::Xte(x) = decoded(SentenceKind::Xte) else { panic!("not XTE") };
        assert_eq!(x.steer, Steer::Right);
        assert!((x.signed_nm() + 0.042).abs() < 0.001);

        let Sentence::Rmb(r) = decoded(SentenceKind::Rmb) else { panic!("not RMB") };
        assert_eq!(r.destination_id, "E1");
        assert!(!r.arrived);
        assert!((r.closing_kn - 6.1).abs() <= 0.1);
    }

    #[test]
    fn config_keys_round_trip() {
        for kind in SentenceKind::ALL {
            assert_eq!(SentenceKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(SentenceKind::from_key("zda"), None);
    }
}
