//! sentence.rs — Typed NMEA 0183 sentence bodies
//!
//! One struct per sentence family, each with its own strongly typed fields.
//! Anything we do not model decodes into [`GenericSentence`], which keeps the
//! raw fields keyed by position so nothing is lost.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::checksum;
use crate::error::DecodeError;
use crate::fields::{self, angle, num, opt_angle, FieldReader, LatLon};
use crate::pgn::PgnCarrier;

/// A sentence body that can be written to and read from comma-separated fields.
pub trait SentenceBody: Sized {
    /// Three-letter sentence formatter (`RMC`, `MWV`, ...).
    const KIND: &'static str;
    /// Fields that must be present before structural parsing starts.
    const MIN_FIELDS: usize;

    fn to_fields(&self) -> Vec<String>;
    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError>;

    fn parse(fields: &[&str]) -> Result<Self, DecodeError> {
        let r = FieldReader::new(Self::KIND, fields);
        r.require(Self::MIN_FIELDS)?;
        Self::from_fields(&r)
    }
}

fn hemi_abs(v: Option<f64>, pos: &str, neg: &str) -> (String, String) {
    match v {
        Some(x) => (num(x.abs(), 1), if x < 0.0 { neg } else { pos }.to_string()),
        None => (String::new(), String::new()),
    }
}

fn active_flag(r: &FieldReader<'_>, index: usize) -> Result<bool, DecodeError> {
    Ok(r.flag(index, &["A", "V"])? == "A")
}

// ── Shared enums ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindReference {
    /// Relative to the bow (apparent wind)
    Relative,
    /// Relative to the bow, corrected for boat motion (true wind angle)
    True,
}

impl WindReference {
    fn code(self) -> &'static str {
        match self {
            Self::Relative => "R",
            Self::True => "T",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedUnit {
    Knots,
    MetersPerSecond,
    KilometersPerHour,
}

impl SpeedUnit {
    fn code(self) -> &'static str {
        match self {
            Self::Knots => "N",
            Self::MetersPerSecond => "M",
            Self::KilometersPerHour => "K",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "N" => Some(Self::Knots),
            "M" => Some(Self::MetersPerSecond),
            "K" => Some(Self::KilometersPerHour),
            _ => None,
        }
    }

    pub fn to_knots(self, v: f64) -> f64 {
        match self {
            Self::Knots => v,
            Self::MetersPerSecond => v * 3600.0 / 1852.0,
            Self::KilometersPerHour => v / 1.852,
        }
    }
}

/// Direction to steer to regain the track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Steer {
    Left,
    Right,
}

impl Steer {
    /// Off track to starboard (positive cross-track) means steer left.
    pub fn from_cross_track(xte_nm: f64) -> Self {
        if xte_nm > 0.0 {
            Self::Left
        } else {
            Self::Right
        }
    }

    fn code(self) -> &'static str {
        match self {
            Self::Left => "L",
            Self::Right => "R",
        }
    }

    fn parse(r: &FieldReader<'_>, index: usize) -> Result<Self, DecodeError> {
        Ok(if r.flag(index, &["L", "R"])? == "L" { Self::Left } else { Self::Right })
    }

    /// Signed cross-track (positive = right of track) from a magnitude.
    pub fn signed(self, distance_nm: f64) -> f64 {
        match self {
            Self::Left => distance_nm,
            Self::Right => -distance_nm,
        }
    }
}

// ── Position / velocity ───────────────────────────────────────────────────────

/// Recommended minimum navigation information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rmc {
    pub time: NaiveTime,
    pub active: bool,
    pub position: LatLon,
    pub sog_kn: f64,
    pub cog_deg: f64,
    pub date: NaiveDate,
    /// Magnetic variation, east positive
    pub variation_deg: Option<f64>,
}

impl SentenceBody for Rmc {
    const KIND: &'static str = "RMC";
    const MIN_FIELDS: usize = 11;

    fn to_fields(&self) -> Vec<String> {
        let (lat, ns) = fields::format_lat(self.position.lat);
        let (lon, ew) = fields::format_lon(self.position.lon);
        let (var, var_ew) = hemi_abs(self.variation_deg, "E", "W");
        vec![
            fields::format_time(self.time),
            if self.active { "A" } else { "V" }.into(),
            lat,
            ns.into(),
            lon,
            ew.into(),
            num(self.sog_kn, 1),
            angle(self.cog_deg, 1),
            fields::format_date(self.date),
            var,
            var_ew,
            "A".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            time: r.time(0)?,
            active: active_flag(r, 1)?,
            position: r.position(2)?,
            sog_kn: r.opt_f64(6)?.unwrap_or(0.0),
            cog_deg: r.opt_f64(7)?.unwrap_or(0.0),
            date: r.date(8)?,
            variation_deg: r.signed(9, "W")?,
        })
    }
}

/// GPS fix data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gga {
    pub time: NaiveTime,
    pub position: LatLon,
    pub fix_quality: u8,
    pub satellites: u8,
    pub hdop: f64,
    pub altitude_m: f64,
}

impl SentenceBody for Gga {
    const KIND: &'static str = "GGA";
    const MIN_FIELDS: usize = 9;

    fn to_fields(&self) -> Vec<String> {
        let (lat, ns) = fields::format_lat(self.position.lat);
        let (lon, ew) = fields::format_lon(self.position.lon);
        vec![
            fields::format_time(self.time),
            lat,
            ns.into(),
            lon,
            ew.into(),
            self.fix_quality.to_string(),
            format!("{:02}", self.satellites),
            num(self.hdop, 1),
            num(self.altitude_m, 1),
            "M".into(),
            "0.0".into(),
            "M".into(),
            String::new(),
            String::new(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            time: r.time(0)?,
            position: r.position(1)?,
            fix_quality: r.u8(5)?,
            satellites: r.u8(6)?,
            hdop: r.f64(7)?,
            altitude_m: r.f64(8)?,
        })
    }
}

/// Track made good and ground speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vtg {
    pub cog_true_deg: f64,
    pub cog_mag_deg: Option<f64>,
    pub sog_kn: f64,
    pub sog_kmh: f64,
}

impl SentenceBody for Vtg {
    const KIND: &'static str = "VTG";
    const MIN_FIELDS: usize = 8;

    fn to_fields(&self) -> Vec<String> {
        vec![
            angle(self.cog_true_deg, 1),
            "T".into(),
            opt_angle(self.cog_mag_deg, 1),
            "M".into(),
            num(self.sog_kn, 1),
            "N".into(),
            num(self.sog_kmh, 1),
            "K".into(),
            "A".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            cog_true_deg: r.f64(0)?,
            cog_mag_deg: r.opt_f64(2)?,
            sog_kn: r.f64(4)?,
            sog_kmh: r.f64(6)?,
        })
    }
}

// ── Heading / speed through water ─────────────────────────────────────────────

/// Water speed and heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vhw {
    pub heading_true_deg: Option<f64>,
    pub heading_mag_deg: Option<f64>,
    pub stw_kn: f64,
    pub stw_kmh: f64,
}

impl SentenceBody for Vhw {
    const KIND: &'static str = "VHW";
    const MIN_FIELDS: usize = 8;

    fn to_fields(&self) -> Vec<String> {
        vec![
            opt_angle(self.heading_true_deg, 1),
            "T".into(),
            opt_angle(self.heading_mag_deg, 1),
            "M".into(),
            num(self.stw_kn, 1),
            "N".into(),
            num(self.stw_kmh, 1),
            "K".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            heading_true_deg: r.opt_f64(0)?,
            heading_mag_deg: r.opt_f64(2)?,
            stw_kn: r.f64(4)?,
            stw_kmh: r.f64(6)?,
        })
    }
}

/// True heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hdt {
    pub heading_deg: f64,
}

impl SentenceBody for Hdt {
    const KIND: &'static str = "HDT";
    const MIN_FIELDS: usize = 2;

    fn to_fields(&self) -> Vec<String> {
        vec![angle(self.heading_deg, 1), "T".into()]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        r.flag(1, &["T"])?;
        Ok(Self { heading_deg: r.f64(0)? })
    }
}

/// Magnetic heading with deviation and variation (east positive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hdg {
    pub heading_mag_deg: f64,
    pub deviation_deg: Option<f64>,
    pub variation_deg: Option<f64>,
}

impl SentenceBody for Hdg {
    const KIND: &'static str = "HDG";
    const MIN_FIELDS: usize = 5;

    fn to_fields(&self) -> Vec<String> {
        let (dev, dev_ew) = hemi_abs(self.deviation_deg, "E", "W");
        let (var, var_ew) = hemi_abs(self.variation_deg, "E", "W");
        vec![angle(self.heading_mag_deg, 1), dev, dev_ew, var, var_ew]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            heading_mag_deg: r.f64(0)?,
            deviation_deg: r.signed(1, "W")?,
            variation_deg: r.signed(3, "W")?,
        })
    }
}

// ── Wind ──────────────────────────────────────────────────────────────────────

/// Wind speed and angle relative to the bow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mwv {
    /// 0..360 clockwise from the bow
    pub angle_deg: f64,
    pub reference: WindReference,
    pub speed: f64,
    pub unit: SpeedUnit,
    pub valid: bool,
}

impl Mwv {
    pub fn speed_kn(&self) -> f64 {
        self.unit.to_knots(self.speed)
    }

    /// Angle folded to (-180, 180], starboard positive.
    pub fn signed_angle_deg(&self) -> f64 {
        let a = self.angle_deg.rem_euclid(360.0);
        if a > 180.0 {
            a - 360.0
        } else {
            a
        }
    }
}

impl SentenceBody for Mwv {
    const KIND: &'static str = "MWV";
    const MIN_FIELDS: usize = 5;

    fn to_fields(&self) -> Vec<String> {
        vec![
            angle(self.angle_deg, 1),
            self.reference.code().into(),
            num(self.speed, 1),
            self.unit.code().into(),
            if self.valid { "A" } else { "V" }.into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        let reference = match r.flag(1, &["R", "T"])? {
            "R" => WindReference::Relative,
            _ => WindReference::True,
        };
        let unit = SpeedUnit::from_code(r.flag(3, &["N", "M", "K"])?).unwrap_or(SpeedUnit::Knots);
        Ok(Self {
            angle_deg: r.f64(0)?,
            reference,
            speed: r.f64(2)?,
            unit,
            valid: active_flag(r, 4)?,
        })
    }
}

/// True wind direction (from) and speed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mwd {
    pub direction_true_deg: f64,
    pub direction_mag_deg: Option<f64>,
    pub speed_kn: f64,
    pub speed_mps: f64,
}

impl SentenceBody for Mwd {
    const KIND: &'static str = "MWD";
    const MIN_FIELDS: usize = 8;

    fn to_fields(&self) -> Vec<String> {
        vec![
            angle(self.direction_true_deg, 1),
            "T".into(),
            opt_angle(self.direction_mag_deg, 1),
            "M".into(),
            num(self.speed_kn, 1),
            "N".into(),
            num(self.speed_mps, 1),
            "M".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            direction_true_deg: r.f64(0)?,
            direction_mag_deg: r.opt_f64(2)?,
            speed_kn: r.f64(4)?,
            speed_mps: r.f64(6)?,
        })
    }
}

// ── Depth ─────────────────────────────────────────────────────────────────────

/// Depth of water.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dpt {
    pub depth_m: f64,
    /// Transducer offset: positive to waterline, negative to keel
    pub offset_m: f64,
    pub max_range_m: Option<f64>,
}

impl SentenceBody for Dpt {
    const KIND: &'static str = "DPT";
    const MIN_FIELDS: usize = 2;

    fn to_fields(&self) -> Vec<String> {
        vec![
            num(self.depth_m, 2),
            num(self.offset_m, 2),
            fields::opt_num(self.max_range_m, 0),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            depth_m: r.f64(0)?,
            offset_m: r.opt_f64(1)?.unwrap_or(0.0),
            max_range_m: r.opt_f64(2)?,
        })
    }
}

// ── Waypoint navigation ───────────────────────────────────────────────────────

/// Cross-track error, measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Xte {
    pub valid: bool,
    pub distance_nm: f64,
    pub steer: Steer,
}

impl Xte {
    pub fn from_signed(valid: bool, xte_nm: f64) -> Self {
        Self {
            valid,
            distance_nm: xte_nm.abs(),
            steer: Steer::from_cross_track(xte_nm),
        }
    }

    /// Positive = vessel is right of track.
    pub fn signed_nm(&self) -> f64 {
        self.steer.signed(self.distance_nm)
    }
}

impl SentenceBody for Xte {
    const KIND: &'static str = "XTE";
    const MIN_FIELDS: usize = 5;

    fn to_fields(&self) -> Vec<String> {
        let status = if self.valid { "A" } else { "V" };
        vec![
            status.into(),
            status.into(),
            num(self.distance_nm, 3),
            self.steer.code().into(),
            "N".into(),
            "A".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            valid: active_flag(r, 0)? && active_flag(r, 1)?,
            distance_nm: r.f64(2)?,
            steer: Steer::parse(r, 3)?,
        })
    }
}

/// Recommended minimum navigation information toward a destination waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rmb {
    pub valid: bool,
    pub xte_nm: f64,
    pub steer: Steer,
    pub origin_id: String,
    pub destination_id: String,
    pub destination: LatLon,
    pub range_nm: f64,
    pub bearing_deg: f64,
    /// Velocity toward the destination; negative when opening
    pub closing_kn: f64,
    pub arrived: bool,
}

impl SentenceBody for Rmb {
    const KIND: &'static str = "RMB";
    const MIN_FIELDS: usize = 13;

    fn to_fields(&self) -> Vec<String> {
        let (lat, ns) = fields::format_lat(self.destination.lat);
        let (lon, ew) = fields::format_lon(self.destination.lon);
        vec![
            if self.valid { "A" } else { "V" }.into(),
            num(self.xte_nm, 3),
            self.steer.code().into(),
            self.origin_id.clone(),
            self.destination_id.clone(),
            lat,
            ns.into(),
            lon,
            ew.into(),
            num(self.range_nm, 2),
            angle(self.bearing_deg, 1),
            num(self.closing_kn, 1),
            if self.arrived { "A" } else { "V" }.into(),
            "A".into(),
        ]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            valid: active_flag(r, 0)?,
            xte_nm: r.f64(1)?,
            steer: Steer::parse(r, 2)?,
            origin_id: r.str(3).to_string(),
            destination_id: r.str(4).to_string(),
            destination: r.position(5)?,
            range_nm: r.f64(9)?,
            bearing_deg: r.f64(10)?,
            closing_kn: r.f64(11)?,
            arrived: active_flag(r, 12)?,
        })
    }
}

/// Waypoint location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wpl {
    pub position: LatLon,
    pub name: String,
}

impl SentenceBody for Wpl {
    const KIND: &'static str = "WPL";
    const MIN_FIELDS: usize = 5;

    fn to_fields(&self) -> Vec<String> {
        let (lat, ns) = fields::format_lat(self.position.lat);
        let (lon, ew) = fields::format_lon(self.position.lon);
        vec![lat, ns.into(), lon, ew.into(), self.name.clone()]
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            position: r.position(0)?,
            name: r.str(4).to_string(),
        })
    }
}

// ── Unknown sentences ─────────────────────────────────────────────────────────

/// Any sentence without a typed model, fields keyed by 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericSentence {
    pub kind: String,
    pub fields: BTreeMap<usize, String>,
}

impl GenericSentence {
    pub fn from_raw(kind: &str, raw: &[&str]) -> Self {
        let fields = raw
            .iter()
            .enumerate()
            .map(|(i, v)| (i + 1, v.to_string()))
            .collect();
        Self { kind: kind.to_string(), fields }
    }

    pub fn field(&self, position: usize) -> Option<&str> {
        self.fields.get(&position).map(String::as_str)
    }
}

// ── Sentence sum type ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Sentence {
    Rmc(Rmc),
    Gga(Gga),
    Vtg(Vtg),
    Vhw(Vhw),
    Hdt(Hdt),
    Hdg(Hdg),
    Mwv(Mwv),
    Mwd(Mwd),
    Dpt(Dpt),
    Xte(Xte),
    Rmb(Rmb),
    Wpl(Wpl),
    Pgn(PgnCarrier),
    Unknown(GenericSentence),
}

impl Sentence {
    pub fn kind(&self) -> &str {
        match self {
            Self::Rmc(_) => Rmc::KIND,
            Self::Gga(_) => Gga::KIND,
            Self::Vtg(_) => Vtg::KIND,
            Self::Vhw(_) => Vhw::KIND,
            Self::Hdt(_) => Hdt::KIND,
            Self::Hdg(_) => Hdg::KIND,
            Self::Mwv(_) => Mwv::KIND,
            Self::Mwd(_) => Mwd::KIND,
            Self::Dpt(_) => Dpt::KIND,
            Self::Xte(_) => Xte::KIND,
            Self::Rmb(_) => Rmb::KIND,
            Self::Wpl(_) => Wpl::KIND,
            Self::Pgn(_) => PgnCarrier::KIND,
            Self::Unknown(g) => &g.kind,
        }
    }

    fn to_fields(&self) -> Vec<String> {
        match self {
            Self::Rmc(s) => s.to_fields(),
            Self::Gga(s) => s.to_fields(),
            Self::Vtg(s) => s.to_fields(),
            Self::Vhw(s) => s.to_fields(),
            Self::Hdt(s) => s.to_fields(),
            Self::Hdg(s) => s.to_fields(),
            Self::Mwv(s) => s.to_fields(),
            Self::Mwd(s) => s.to_fields(),
            Self::Dpt(s) => s.to_fields(),
            Self::Xte(s) => s.to_fields(),
            Self::Rmb(s) => s.to_fields(),
            Self::Wpl(s) => s.to_fields(),
            Self::Pgn(s) => s.to_fields(),
            Self::Unknown(g) => g.fields.values().cloned().collect(),
        }
    }
}

/// A complete sentence: talker identifier plus typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NmeaSentence {
    /// Two-character talker (`GP`, `II`, ...) or `P` for proprietary sentences
    pub talker: String,
    pub sentence: Sentence,
}

impl NmeaSentence {
    pub fn new(talker: impl Into<String>, sentence: Sentence) -> Self {
        Self { talker: talker.into(), sentence }
    }

    pub fn kind(&self) -> &str {
        self.sentence.kind()
    }

    /// Address field, e.g. `GPRMC`.
    pub fn address(&self) -> String {
        format!("{}{}", self.talker, self.kind())
    }

    /// Full wire form: `$<address>,<fields>*<checksum>\r\n`.
    pub fn encode(&self) -> String {
        let mut payload = self.address();
        for f in self.sentence.to_fields() {
            payload.push(',');
            payload.push_str(&f);
        }
        checksum::frame('$', &payload)
    }
}

impl std::fmt::Display for NmeaSentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

impl std::str::FromStr for NmeaSentence {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::codec::decode(s)
    }
}
