//! fields.rs — Field-level formatting and parsing
//!
//! Positions use the NMEA `ddmm.mmmm` / `dddmm.mmmm` layout with a separate
//! hemisphere field. Times are `hhmmss.ss` UTC, dates `ddmmyy`.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Geographic position in decimal degrees (north and east positive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

// ── Formatting ────────────────────────────────────────────────────────────────

fn format_coord(value: f64, deg_width: usize) -> String {
    let abs = value.abs();
    let mut deg = abs.trunc();
    let mut min = ((abs - deg) * 60.0 * 10_000.0).round() / 10_000.0;
    if min >= 60.0 {
        deg += 1.0;
        min -= 60.0;
    }
    format!("{:0w$}{:07.4}", deg as u32, min, w = deg_width)
}

/// Latitude as `(ddmm.mmmm, N|S)`.
pub fn format_lat(lat: f64) -> (String, &'static str) {
    (format_coord(lat, 2), if lat < 0.0 { "S" } else { "N" })
}

/// Longitude as `(dddmm.mmmm, E|W)`.
pub fn format_lon(lon: f64) -> (String, &'static str) {
    (format_coord(lon, 3), if lon < 0.0 { "W" } else { "E" })
}

pub fn format_time(t: NaiveTime) -> String {
    format!(
        "{:02}{:02}{:02}.{:02}",
        t.hour(),
        t.minute(),
        t.second(),
        t.nanosecond() / 10_000_000
    )
}

pub fn format_date(d: NaiveDate) -> String {
    d.format("%d%m%y").to_string()
}

/// Fixed-decimal number.
pub fn num(v: f64, decimals: usize) -> String {
    format!("{v:.decimals$}")
}

/// Angle in `[0, 360)` after rounding, so 359.96 prints as `0.0`, not `360.0`.
pub fn angle(v: f64, decimals: usize) -> String {
    let scale = 10f64.powi(decimals as i32);
    let mut a = (v.rem_euclid(360.0) * scale).round() / scale;
    if a >= 360.0 {
        a -= 360.0;
    }
    num(a, decimals)
}

pub fn opt_num(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| num(x, decimals)).unwrap_or_default()
}

pub fn opt_angle(v: Option<f64>, decimals: usize) -> String {
    v.map(|x| angle(x, decimals)).unwrap_or_default()
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Typed access to the data fields of one sentence (header excluded).
/// Error indices are 1-based, matching field numbering in the standard.
pub struct FieldReader<'a> {
    kind: &'a str,
    fields: &'a [&'a str],
}

impl<'a> FieldReader<'a> {
    pub fn new(kind: &'a str, fields: &'a [&'a str]) -> Self {
        Self { kind, fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn require(&self, min: usize) -> Result<(), DecodeError> {
        if self.fields.len() < min {
            return Err(DecodeError::TooFewFields {
                kind: self.kind.to_string(),
                expected: min,
                found: self.fields.len(),
            });
        }
        Ok(())
    }

    fn invalid(&self, index: usize) -> DecodeError {
        DecodeError::InvalidField {
            kind: self.kind.to_string(),
            index: index + 1,
            value: self.str(index).to_string(),
        }
    }

    pub fn str(&self, index: usize) -> &'a str {
        self.fields.get(index).copied().unwrap_or("")
    }

    pub fn f64(&self, index: usize) -> Result<f64, DecodeError> {
        self.str(index)
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(index))
    }

    pub fn opt_f64(&self, index: usize) -> Result<Option<f64>, DecodeError> {
        if self.str(index).is_empty() {
            Ok(None)
        } else {
            self.f64(index).map(Some)
        }
    }

    pub fn u8(&self, index: usize) -> Result<u8, DecodeError> {
        self.str(index).parse::<u8>().map_err(|_| self.invalid(index))
    }

    /// One of the listed single-character flags.
    pub fn flag(&self, index: usize, allowed: &[&str]) -> Result<&'a str, DecodeError> {
        let v = self.str(index);
        if allowed.contains(&v) {
            Ok(v)
        } else {
            Err(self.invalid(index))
        }
    }

    /// Signed value whose sign lives in the next field (`E`/`W`, `L`/`R`).
    pub fn signed(&self, index: usize, negative: &str) -> Result<Option<f64>, DecodeError> {
        Ok(self
            .opt_f64(index)?
            .map(|v| if self.str(index + 1) == negative { -v } else { v }))
    }

    fn coord(&self, index: usize, deg_width: usize, hemis: [&str; 2]) -> Result<f64, DecodeError> {
        let raw = self.str(index);
        let ascii_degrees = raw.len() > deg_width && raw.as_bytes()[..deg_width].iter().all(u8::is_ascii_digit);
        if !ascii_degrees {
            return Err(self.invalid(index));
        }
        let deg: f64 = raw[..deg_width].parse().map_err(|_| self.invalid(index))?;
        let min: f64 = raw[deg_width..].parse().map_err(|_| self.invalid(index))?;
        if !(0.0..60.0).contains(&min) {
            return Err(self.invalid(index));
        }
        let value = deg + min / 60.0;
        match self.str(index + 1) {
            h if h == hemis[0] => Ok(value),
            h if h == hemis[1] => Ok(-value),
            _ => Err(self.invalid(index + 1)),
        }
    }

    /// Latitude in fields `index` (value) and `index + 1` (hemisphere).
    pub fn lat(&self, index: usize) -> Result<f64, DecodeError> {
        self.coord(index, 2, ["N", "S"])
    }

    /// Longitude in fields `index` (value) and `index + 1` (hemisphere).
    pub fn lon(&self, index: usize) -> Result<f64, DecodeError> {
        self.coord(index, 3, ["E", "W"])
    }

    pub fn position(&self, index: usize) -> Result<LatLon, DecodeError> {
        Ok(LatLon::new(self.lat(index)?, self.lon(index + 2)?))
    }

    pub fn time(&self, index: usize) -> Result<NaiveTime, DecodeError> {
        let raw = self.str(index);
        // Byte slicing below needs six ASCII digits up front
        if raw.len() < 6 || !raw.as_bytes()[..6].iter().all(u8::is_ascii_digit) {
            return Err(self.invalid(index));
        }
        let part = |r: std::ops::Range<usize>| raw[r].parse::<u32>().map_err(|_| self.invalid(index));
        let (h, m, s) = (part(0..2)?, part(2..4)?, part(4..6)?);
        let frac = if raw.len() > 6 {
            let f: f64 = raw[6..].parse().map_err(|_| self.invalid(index))?;
            (f * 1000.0).round() as u32
        } else {
            0
        };
        NaiveTime::from_hms_milli_opt(h, m, s, frac).ok_or_else(|| self.invalid(index))
    }

    pub fn date(&self, index: usize) -> Result<NaiveDate, DecodeError> {
        let raw = self.str(index);
        if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.invalid(index));
        }
        let part = |r: std::ops::Range<usize>| raw[r].parse::<u32>().unwrap_or(0);
        NaiveDate::from_ymd_opt(2000 + part(4..6) as i32, part(2..4), part(0..2))
            .ok_or_else(|| self.invalid(index))
    }
}
