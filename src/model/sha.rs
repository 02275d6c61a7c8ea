use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw 20-byte SHA-1 git object id
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Sha(pub [u8; 20]);

impl Sha {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Sha)
    }

    /// Parse a full 40-character hex object id
    pub fn from_hex(hex_str: &str) -> Option<Self> {
        if hex_str.len() != 40 {
            return None;
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut out).ok()?;
        Some(Sha(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form, clamped to the full length
    pub fn short(&self, len: usize) -> String {
        let mut s = self.to_hex();
        s.truncate(len.min(40));
        s
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha({})", self.short(10))
    }
}

impl FromStr for Sha {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sha::from_hex(s.trim()).ok_or_else(|| anyhow::anyhow!("not a 40-digit hex object id: {s:?}"))
    }
}
