//! digest.rs — SHA-256 chain over the emitted sentence stream
//!
//! Each sentence is folded into the running hash: `head = SHA-256(head || text)`.
//! Two runs with the same inputs end on the same head, which makes
//! determinism checkable from outside the process through `status()`.

use sha2::{Digest, Sha256};

const GENESIS: [u8; 32] = [0; 32];

#[derive(Debug, Clone)]
pub struct StreamDigest {
    head: [u8; 32],
    count: u64,
}

impl Default for StreamDigest {
    fn default() -> Self {
        Self { head: GENESIS, count: 0 }
    }
}

impl StreamDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sentence: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.head);
        hasher.update(sentence);
        self.head = hasher.finalize().into();
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn hex(&self) -> String {
        hex::encode(self.head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matters() {
        let mut a = StreamDigest::new();
        a.update(b"$A*00\r\n");
        a.update(b"$B*00\r\n");
        let mut b = StreamDigest::new();
        b.update(b"$B*00\r\n");
        b.update(b"$A*00\r\n");
        assert_ne!(a.hex(), b.hex());
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn empty_chain_is_genesis() {
        assert_eq!(StreamDigest::new().hex(), "0".repeat(64));
    }
}
