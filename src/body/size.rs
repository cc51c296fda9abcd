//! Human-readable byte sizes (`"1mb"`, `"512kb"`, `1048576`).
//!
//! Units are binary multiples: `kb` = 1024 bytes, `mb` = 1024 kb, and so on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A byte count parsed from a size string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "RawByteSize", into = "u64")]
pub struct ByteSize(u64);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid byte size {0:?}")]
pub struct ByteSizeError(String);

impl ByteSize {
    pub const fn bytes(n: u64) -> Self {
        Self(n)
    }

    pub const fn kib(n: u64) -> Self {
        Self(n * 1024)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n * 1024 * 1024)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Size as a buffer length, saturating on 32-bit targets.
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let multiplier: u64 = match unit.trim() {
            "" | "b" => 1,
            "kb" | "k" => 1 << 10,
            "mb" | "m" => 1 << 20,
            "gb" | "g" => 1 << 30,
            "tb" | "t" => 1 << 40,
            _ => return Err(ByteSizeError(s.to_string())),
        };

        let value: f64 = number.parse().map_err(|_| ByteSizeError(s.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ByteSizeError(s.to_string()));
        }

        Ok(Self((value * multiplier as f64).floor() as u64))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}b", self.0)
    }
}

impl From<ByteSize> for u64 {
    fn from(size: ByteSize) -> Self {
        size.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawByteSize {
    Count(u64),
    Text(String),
}

impl TryFrom<RawByteSize> for ByteSize {
    type Error = ByteSizeError;

    fn try_from(raw: RawByteSize) -> Result<Self, Self::Error> {
        match raw {
            RawByteSize::Count(n) => Ok(Self(n)),
            RawByteSize::Text(s) => s.parse(),
        }
    }
}
