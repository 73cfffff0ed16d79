//! Byte sizes with unit parsing and display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A size in bytes.
///
/// Supports parsing from strings like "512MB", "10GB", "64KB", "100B",
/// and bare integers (interpreted as bytes). Units are binary multiples
/// (1KB = 1024 bytes) and case-insensitive. Displays using the largest unit
/// that divides the value exactly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ByteSize(u64);

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

impl ByteSize {
    /// Creates a size from a byte count.
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Returns the size in bytes.
    pub const fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteSize({self})")
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        if b == 0 {
            return write!(f, "0B");
        }
        for (unit, name) in [(TB, "TB"), (GB, "GB"), (MB, "MB"), (KB, "KB")] {
            if b % unit == 0 {
                return write!(f, "{}{name}", b / unit);
            }
        }
        write!(f, "{b}B")
    }
}

/// Error type for parsing size strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid size: '{input}'")]
pub struct ParseSizeError {
    /// The input string that failed to parse.
    pub input: String,
}

impl FromStr for ByteSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || ParseSizeError {
            input: s.to_string(),
        };

        let lower = s.to_ascii_lowercase();
        for (suffix, unit) in [("tb", TB), ("gb", GB), ("mb", MB), ("kb", KB), ("b", 1)] {
            if let Some(num) = lower.strip_suffix(suffix) {
                let val: u64 = num.trim().parse().map_err(|_| err())?;
                return val.checked_mul(unit).map(ByteSize).ok_or_else(err);
            }
        }

        // Bare number: bytes
        let val: u64 = s.parse().map_err(|_| err())?;
        Ok(ByteSize(val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!("100B".parse::<ByteSize>().unwrap().bytes(), 100);
        assert_eq!("64KB".parse::<ByteSize>().unwrap().bytes(), 64 * 1024);
        assert_eq!("512mb".parse::<ByteSize>().unwrap().bytes(), 512 * MB);
        assert_eq!("10 GB".parse::<ByteSize>().unwrap().bytes(), 10 * GB);
        assert_eq!("1TB".parse::<ByteSize>().unwrap().bytes(), TB);
    }

    #[test]
    fn parse_bare_number() {
        assert_eq!("4096".parse::<ByteSize>().unwrap().bytes(), 4096);
        assert_eq!("0".parse::<ByteSize>().unwrap().bytes(), 0);
    }

    #[test]
    fn parse_errors() {
        assert!("".parse::<ByteSize>().is_err());
        assert!("lots".parse::<ByteSize>().is_err());
        assert!("1.5GB".parse::<ByteSize>().is_err());
        assert!("-3MB".parse::<ByteSize>().is_err());
        assert!("99999999999TB".parse::<ByteSize>().is_err());
    }

    #[test]
    fn display_picks_exact_unit() {
        assert_eq!(ByteSize::new(0).to_string(), "0B");
        assert_eq!(ByteSize::new(1536).to_string(), "1536B");
        assert_eq!(ByteSize::new(2 * KB).to_string(), "2KB");
        assert_eq!(ByteSize::new(3 * GB).to_string(), "3GB");
    }

    #[test]
    fn display_parse_roundtrip() {
        let size = ByteSize::new(768 * MB);
        assert_eq!(size.to_string().parse::<ByteSize>().unwrap(), size);
    }
}
