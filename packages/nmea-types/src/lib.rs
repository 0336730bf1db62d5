//! nmea-types — NMEA 0183 sentence model and codec
//!
//! Shared by the simulator and by anything consuming its output:
//! typed sentence bodies, checksum framing, strict decoding, the `$PCDIN`
//! carrier for single-frame NMEA 2000 PGNs, and the JSON envelope used on
//! message-framed transports.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod fields;
pub mod framed;
pub mod pgn;
pub mod sentence;

pub use codec::{decode, decode_bytes, encode};
pub use error::DecodeError;
pub use fields::LatLon;
pub use framed::FramedSentence;
pub use pgn::{PgnCarrier, PgnPayload};
pub use sentence::{NmeaSentence, Sentence, SentenceBody};
