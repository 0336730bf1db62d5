//! codec.rs — Sentence encoding and decoding
//!
//! Decoding is strict: checksum first, then the address field, then the
//! per-type field layout. Sentence kinds without a typed model come back as
//! [`Sentence::Unknown`] rather than an error.

use crate::checksum;
use crate::error::DecodeError;
use crate::pgn::PgnCarrier;
use crate::sentence::*;

pub fn encode(sentence: &NmeaSentence) -> String {
    sentence.encode()
}

/// Decode one sentence. Surrounding whitespace and the trailing CR/LF are ignored.
pub fn decode(line: &str) -> Result<NmeaSentence, DecodeError> {
    let (_, payload) = checksum::verify(line.trim())?;

    let mut parts = payload.split(',');
    let address = parts.next().unwrap_or_default();
    let fields: Vec<&str> = parts.collect();
    let (talker, kind) = split_address(address)?;

    if fields.is_empty() {
        return Err(DecodeError::TooFewFields {
            kind: kind.to_string(),
            expected: 1,
            found: 0,
        });
    }

    let sentence = match (talker, kind) {
        ("P", "CDIN") => Sentence::Pgn(PgnCarrier::parse(&fields)?),
        ("P", _) => Sentence::Unknown(GenericSentence::from_raw(kind, &fields)),
        (_, "RMC") => Sentence::Rmc(Rmc::parse(&fields)?),
        (_, "GGA") => Sentence::Gga(Gga::parse(&fields)?),
        (_, "VTG") => Sentence::Vtg(Vtg::parse(&fields)?),
        (_, "VHW") => Sentence::Vhw(Vhw::parse(&fields)?),
        (_, "HDT") => Sentence::Hdt(Hdt::parse(&fields)?),
        (_, "HDG") => Sentence::Hdg(Hdg::parse(&fields)?),
        (_, "MWV") => Sentence::Mwv(Mwv::parse(&fields)?),
        (_, "MWD") => Sentence::Mwd(Mwd::parse(&fields)?),
        (_, "DPT") => Sentence::Dpt(Dpt::parse(&fields)?),
        (_, "XTE") => Sentence::Xte(Xte::parse(&fields)?),
        (_, "RMB") => Sentence::Rmb(Rmb::parse(&fields)?),
        (_, "WPL") => Sentence::Wpl(Wpl::parse(&fields)?),
        _ => Sentence::Unknown(GenericSentence::from_raw(kind, &fields)),
    };

    Ok(NmeaSentence::new(talker, sentence))
}

/// Decode raw bytes off the wire. Non-UTF-8 input fails the checksum or header checks.
pub fn decode_bytes(raw: &[u8]) -> Result<NmeaSentence, DecodeError> {
    decode(&String::from_utf8_lossy(raw))
}

/// `GPRMC` -> (`GP`, `RMC`); `PCDIN` -> (`P`, `CDIN`).
fn split_address(address: &str) -> Result<(&str, &str), DecodeError> {
    let valid_chars = address
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if !valid_chars {
        return Err(DecodeError::InvalidHeader(address.to_string()));
    }
    if address.starts_with('P') && address.len() >= 4 {
        return Ok(address.split_at(1));
    }
    if address.len() == 5 {
        return Ok(address.split_at(2));
    }
    Err(DecodeError::InvalidHeader(address.to_string()))
}
