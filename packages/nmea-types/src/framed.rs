//! framed.rs — JSON envelope used by message-framed clients (WebSocket)

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::DecodeError;
use crate::sentence::NmeaSentence;

/// `{"type":"RMC","payload":"$GPRMC,...*hh","timestamp":1718000000000}`
///
/// `payload` is the exact sentence text without the CR/LF terminator, so it
/// decodes to the same sentence a stream client receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramedSentence {
    #[serde(rename = "type")]
    pub tag: String,
    pub payload: String,
    /// Milliseconds since the Unix epoch, simulated clock
    pub timestamp: u64,
}

impl FramedSentence {
    pub fn new(tag: impl Into<String>, sentence_text: &str, timestamp: u64) -> Self {
        Self {
            tag: tag.into(),
            payload: sentence_text.trim_end_matches(['\r', '\n']).to_string(),
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn decode(&self) -> Result<NmeaSentence, DecodeError> {
        codec::decode(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_field_names() {
        let f = FramedSentence::new(
            "GGA",
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n",
            42,
        );
        let json = f.to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "GGA");
        assert_eq!(v["timestamp"], 42);
        assert!(!v["payload"].as_str().unwrap().ends_with('\n'));

        let back = FramedSentence::from_json(&json).unwrap();
        assert_eq!(back.decode().unwrap().kind(), "GGA");
    }
}
