//! checksum.rs — NMEA 0183 XOR checksum
//!
//! The checksum is the XOR of every byte between the start delimiter (`$`/`!`)
//! and the `*`, rendered as two upper-case hex digits.

use crate::error::DecodeError;

/// XOR of all bytes in `payload` (the text between the delimiters).
pub fn checksum(payload: &str) -> u8 {
    payload.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Wrap a payload into a complete, CRLF-terminated sentence.
pub fn frame(start: char, payload: &str) -> String {
    format!("{start}{payload}*{:02X}\r\n", checksum(payload))
}

/// Split a trimmed sentence into `(start, payload)` after validating the
/// start delimiter and checksum. Field parsing happens later.
pub fn verify(sentence: &str) -> Result<(char, &str), DecodeError> {
    let mut chars = sentence.chars();
    let start = chars.next().ok_or(DecodeError::Empty)?;
    if start != '$' && start != '!' {
        return Err(DecodeError::MissingStartDelimiter(start));
    }

    let body = &sentence[1..];
    let star = body.rfind('*').ok_or(DecodeError::MissingChecksum)?;
    let (payload, tail) = (&body[..star], &body[star + 1..]);

    if tail.len() != 2 || !tail.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DecodeError::MalformedChecksum(tail.to_string()));
    }
    let transmitted = u8::from_str_radix(tail, 16)
        .map_err(|_| DecodeError::MalformedChecksum(tail.to_string()))?;

    let computed = checksum(payload);
    if computed != transmitted {
        return Err(DecodeError::ChecksumMismatch { computed, transmitted });
    }
    Ok((start, payload))
}
