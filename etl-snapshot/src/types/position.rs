use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bail;
use crate::error::{ErrorKind, EtlError};

/// A point in the change log.
///
/// Positions are totally ordered within one change log timeline and have a canonical string
/// form of two hexadecimal halves, `16/B374D848`. [`LogPosition::ZERO`] means that no position
/// has been reached yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogPosition(u64);

impl LogPosition {
    pub const ZERO: LogPosition = LogPosition(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this position is at or after `other`.
    pub fn at_least(&self, other: &LogPosition) -> bool {
        self.0 >= other.0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl FromStr for LogPosition {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((high, low)) = s.split_once('/') else {
            bail!(
                ErrorKind::InvalidPosition,
                "Log position is not in the `high/low` form",
                format!("invalid log position '{s}'")
            );
        };

        let parse_half = |half: &str| {
            u32::from_str_radix(half, 16).map_err(|err| {
                crate::etl_error!(
                    ErrorKind::InvalidPosition,
                    "Log position half is not a 32 bit hexadecimal number",
                    format!("invalid log position '{s}': {err}")
                )
            })
        };

        let high = parse_half(high)? as u64;
        let low = parse_half(low)? as u64;

        Ok(Self((high << 32) | low))
    }
}

impl TryFrom<String> for LogPosition {
    type Error = EtlError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogPosition> for String {
    fn from(position: LogPosition) -> Self {
        position.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_survives_parsing() {
        let position: LogPosition = "16/B374D848".parse().unwrap();

        assert_eq!(position.as_u64(), (0x16 << 32) | 0xB374_D848);
        assert_eq!(position.to_string(), "16/B374D848");
        assert_eq!(LogPosition::ZERO.to_string(), "0/0");
    }

    #[test]
    fn rejects_malformed_positions() {
        for input in ["", "12", "1/2/3", "G/1", "1/100000000"] {
            let err = input.parse::<LogPosition>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPosition, "input {input:?}");
        }
    }

    #[test]
    fn at_least_follows_total_order() {
        let low = LogPosition::new(5);
        let high = LogPosition::new(1 << 32);

        assert!(high.at_least(&low));
        assert!(low.at_least(&low));
        assert!(!low.at_least(&high));
        assert!(LogPosition::ZERO.is_zero());
        assert!(!low.is_zero());
    }
}
