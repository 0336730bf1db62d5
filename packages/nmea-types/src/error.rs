//! error.rs — Decode failures
//!
//! Every way an inbound sentence can be rejected. Decoding never panics; the
//! caller gets one of these and decides whether to log, count, or surface it.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty sentence")]
    Empty,

    #[error("sentence must start with '$' or '!' (found {0:?})")]
    MissingStartDelimiter(char),

    #[error("sentence has no '*' checksum delimiter")]
    MissingChecksum,

    #[error("checksum field {0:?} is not two hex digits")]
    MalformedChecksum(String),

    #[error("checksum mismatch: computed {computed:02X}, transmitted {transmitted:02X}")]
    ChecksumMismatch { computed: u8, transmitted: u8 },

    #[error("invalid address field {0:?}")]
    InvalidHeader(String),

    #[error("{kind}: expected at least {expected} fields, found {found}")]
    TooFewFields {
        kind: String,
        expected: usize,
        found: usize,
    },

    #[error("{kind}: field {index} has invalid value {value:?}")]
    InvalidField {
        kind: String,
        index: usize,
        value: String,
    },

    #[error("PGN carrier is truncated: {0}")]
    TruncatedCarrier(&'static str),

    #[error("invalid hex in PGN carrier: {0:?}")]
    InvalidHex(String),

    #[error("PGN carrier payload has {0} bytes (max 7)")]
    PayloadTooLong(usize),

    #[error("PGN {pgn} payload has {found} bytes, expected {expected}")]
    PayloadSize { pgn: u32, expected: usize, found: usize },
}

impl DecodeError {
    /// Short stable label used as a counter key.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::MissingStartDelimiter(_) => "start_delimiter",
            Self::MissingChecksum | Self::MalformedChecksum(_) => "checksum_field",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::InvalidHeader(_) => "header",
            Self::TooFewFields { .. } => "field_count",
            Self::InvalidField { .. } => "field_value",
            Self::TruncatedCarrier(_)
            | Self::InvalidHex(_)
            | Self::PayloadTooLong(_)
            | Self::PayloadSize { .. } => "pgn_carrier",
        }
    }
}
