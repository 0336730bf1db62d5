//! pgn.rs — NMEA 2000 PGN payloads carried inside `$PCDIN` sentences
//!
//! Payload layouts are `#[repr(C)]` plain-old-data so they can be cast to and
//! from the byte slice that travels as hex in the carrier sentence. Multi-byte
//! fields are stored as little-endian byte arrays, as on the CAN bus.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::fields::FieldReader;
use crate::sentence::SentenceBody;

pub const PGN_SPEED: u32 = 128259;
pub const PGN_WATER_DEPTH: u32 = 128267;
pub const PGN_WIND_DATA: u32 = 130306;

/// Single-frame carrier limit.
pub const MAX_PGN_PAYLOAD: usize = 7;

// ── Carrier ───────────────────────────────────────────────────────────────────

/// `$PCDIN,<pgn hex6>,<timestamp hex8>,<source hex2>,<data hex>*hh`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgnCarrier {
    pub pgn: u32,
    pub timestamp_ms: u32,
    pub source: u8,
    pub data: Vec<u8>,
}

impl PgnCarrier {
    pub fn new(pgn: u32, timestamp_ms: u32, source: u8, data: Vec<u8>) -> Result<Self, DecodeError> {
        if data.is_empty() {
            return Err(DecodeError::TruncatedCarrier("no data bytes"));
        }
        if data.len() > MAX_PGN_PAYLOAD {
            return Err(DecodeError::PayloadTooLong(data.len()));
        }
        Ok(Self { pgn, timestamp_ms, source, data })
    }

    pub fn from_payload<T: Pod>(
        pgn: u32,
        timestamp_ms: u32,
        source: u8,
        payload: &T,
    ) -> Result<Self, DecodeError> {
        Self::new(pgn, timestamp_ms, source, bytemuck::bytes_of(payload).to_vec())
    }

    /// Interpret the data bytes according to the PGN.
    pub fn payload(&self) -> Result<PgnPayload, DecodeError> {
        match self.pgn {
            PGN_WIND_DATA => cast(self.pgn, &self.data).map(PgnPayload::Wind),
            PGN_SPEED => cast(self.pgn, &self.data).map(PgnPayload::Speed),
            PGN_WATER_DEPTH => cast(self.pgn, &self.data).map(PgnPayload::Depth),
            _ => Ok(PgnPayload::Other),
        }
    }
}

fn cast<T: Pod>(pgn: u32, data: &[u8]) -> Result<T, DecodeError> {
    bytemuck::try_pod_read_unaligned(data).map_err(|_| DecodeError::PayloadSize {
        pgn,
        expected: std::mem::size_of::<T>(),
        found: data.len(),
    })
}

fn hex_u32(raw: &str, digits: usize) -> Result<u32, DecodeError> {
    if raw.len() != digits {
        return Err(DecodeError::InvalidHex(raw.to_string()));
    }
    u32::from_str_radix(raw, 16).map_err(|_| DecodeError::InvalidHex(raw.to_string()))
}

impl SentenceBody for PgnCarrier {
    const KIND: &'static str = "CDIN";
    const MIN_FIELDS: usize = 4;

    fn to_fields(&self) -> Vec<String> {
        vec![
            format!("{:06X}", self.pgn),
            format!("{:08X}", self.timestamp_ms),
            format!("{:02X}", self.source),
            hex::encode_upper(&self.data),
        ]
    }

    fn parse(fields: &[&str]) -> Result<Self, DecodeError> {
        if fields.len() < Self::MIN_FIELDS {
            return Err(DecodeError::TruncatedCarrier("missing carrier fields"));
        }
        Self::from_fields(&FieldReader::new(Self::KIND, fields))
    }

    fn from_fields(r: &FieldReader<'_>) -> Result<Self, DecodeError> {
        let pgn = hex_u32(r.str(0), 6)?;
        let timestamp_ms = hex_u32(r.str(1), 8)?;
        let source = hex_u32(r.str(2), 2)? as u8;
        let raw = r.str(3);
        let data = hex::decode(raw).map_err(|e| match e {
            hex::FromHexError::OddLength => DecodeError::TruncatedCarrier("odd number of hex digits"),
            _ => DecodeError::InvalidHex(raw.to_string()),
        })?;
        Self::new(pgn, timestamp_ms, source, data)
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgnPayload {
    Wind(WindDataPayload),
    Speed(SpeedPayload),
    Depth(DepthPayload),
    /// Carried through untouched
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindPgnReference {
    TrueNorth = 0,
    Apparent = 2,
    TrueBoat = 3,
}

/// PGN 130306 Wind Data: sid, speed (0.01 m/s), angle (0.0001 rad), reference.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct WindDataPayload {
    pub sid: u8,
    speed: [u8; 2],
    angle: [u8; 2],
    pub reference: u8,
}

impl WindDataPayload {
    pub fn new(sid: u8, speed_mps: f64, angle_rad: f64, reference: WindPgnReference) -> Self {
        let speed = (speed_mps.max(0.0) * 100.0).round().min(u16::MAX as f64) as u16;
        let angle = (angle_rad.rem_euclid(std::f64::consts::TAU) * 10_000.0).round() as u16;
        Self {
            sid,
            speed: speed.to_le_bytes(),
            angle: angle.to_le_bytes(),
            reference: reference as u8,
        }
    }

    pub fn speed_mps(&self) -> f64 {
        u16::from_le_bytes(self.speed) as f64 / 100.0
    }

    pub fn angle_rad(&self) -> f64 {
        u16::from_le_bytes(self.angle) as f64 / 10_000.0
    }
}

/// PGN 128259 Speed: sid, speed through water, speed over ground (0.01 m/s).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SpeedPayload {
    pub sid: u8,
    stw: [u8; 2],
    sog: [u8; 2],
}

impl SpeedPayload {
    pub fn new(sid: u8, stw_mps: f64, sog_mps: f64) -> Self {
        let enc = |v: f64| ((v.max(0.0) * 100.0).round().min(u16::MAX as f64) as u16).to_le_bytes();
        Self { sid, stw: enc(stw_mps), sog: enc(sog_mps) }
    }

    pub fn stw_mps(&self) -> f64 {
        u16::from_le_bytes(self.stw) as f64 / 100.0
    }

    pub fn sog_mps(&self) -> f64 {
        u16::from_le_bytes(self.sog) as f64 / 100.0
    }
}

/// PGN 128267 Water Depth: sid, depth below transducer (0.01 m), offset (0.001 m).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DepthPayload {
    pub sid: u8,
    depth: [u8; 4],
    offset: [u8; 2],
}

impl DepthPayload {
    pub fn new(sid: u8, depth_m: f64, offset_m: f64) -> Self {
        let depth = (depth_m.max(0.0) * 100.0).round().min(u32::MAX as f64) as u32;
        let offset = (offset_m * 1000.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        Self { sid, depth: depth.to_le_bytes(), offset: offset.to_le_bytes() }
    }

    pub fn depth_m(&self) -> f64 {
        u32::from_le_bytes(self.depth) as f64 / 100.0
    }

    pub fn offset_m(&self) -> f64 {
        i16::from_le_bytes(self.offset) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sizes_fit_a_single_frame() {
        assert_eq!(std::mem::size_of::<WindDataPayload>(), 6);
        assert_eq!(std::mem::size_of::<SpeedPayload>(), 5);
        assert_eq!(std::mem::size_of::<DepthPayload>(), 7);
    }

    #[test]
    fn wind_payload_survives_carrier() {
        let wind = WindDataPayload::new(3, 7.72, 0.785398, WindPgnReference::Apparent);
        let carrier = PgnCarrier::from_payload(PGN_WIND_DATA, 1000, 0x23, &wind).unwrap();
        let fields = carrier.to_fields();
        assert_eq!(fields[0], "01FD02");
        assert_eq!(fields[2], "23");

        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let back = PgnCarrier::parse(&refs).unwrap();
        match back.payload().unwrap() {
            PgnPayload::Wind(w) => {
                assert!((w.speed_mps() - 7.72).abs() < 0.005);
                assert!((w.angle_rad() - 0.7854).abs() < 0.0001);
                assert_eq!(w.reference, WindPgnReference::Apparent as u8);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn depth_offset_is_signed() {
        let d = DepthPayload::new(0, 12.34, -0.5);
        assert!((d.depth_m() - 12.34).abs() < 1e-9);
        assert!((d.offset_m() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn oversized_payload_rejected() {
        let err = PgnCarrier::new(PGN_SPEED, 0, 0, vec![0; 8]).unwrap_err();
        assert_eq!(err, DecodeError::PayloadTooLong(8));
    }

    #[test]
    fn odd_hex_is_truncation() {
        let err = PgnCarrier::parse(&["01F503", "00000000", "01", "ABC"]).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedCarrier(_)));
    }

    #[test]
    fn wrong_length_for_known_pgn() {
        let carrier = PgnCarrier::new(PGN_WATER_DEPTH, 0, 1, vec![1, 2, 3]).unwrap();
        assert_eq!(
            carrier.payload().unwrap_err(),
            DecodeError::PayloadSize { pgn: PGN_WATER_DEPTH, expected: 7, found: 3 }
        );
    }

    #[test]
    fn missing_fields_is_truncation() {
        let err = PgnCarrier::parse(&["01F503", "00000000"]).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedCarrier("missing carrier fields"));
    }
}
