//! Size-with-unit quota values (`"10g"`, `"512m"`, `"0"`)

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{EnforcerError, EnforcerResult};

/// A block limit in the notation `xfs_quota` accepts: digits followed by an
/// optional binary unit (`k`, `m`, `g`, `t`, `p`, `e`, case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QuotaSize(String);

impl QuotaSize {
    pub fn parse(input: &str) -> EnforcerResult<Self> {
        let trimmed = input.trim();
        let digits_end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(digits_end);

        if digits.is_empty() || unit.len() > 1 || unit_shift(unit).is_none() {
            return Err(EnforcerError::InvalidSize(input.to_string()));
        }
        // Reject values that cannot be represented in bytes.
        if digits.parse::<u64>().is_err() {
            return Err(EnforcerError::InvalidSize(input.to_string()));
        }

        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// The zero limit, which removes enforcement
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value in bytes, saturating at `u64::MAX`.
    pub fn bytes(&self) -> u64 {
        let digits_end = self
            .0
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(self.0.len());
        let (digits, unit) = self.0.split_at(digits_end);
        let value: u64 = digits.parse().unwrap_or(u64::MAX);
        let shift = unit_shift(unit).unwrap_or(0);
        value.checked_shl(shift).filter(|v| v >> shift == value).unwrap_or(u64::MAX)
    }

    pub fn is_zero(&self) -> bool {
        self.bytes() == 0
    }
}

fn unit_shift(unit: &str) -> Option<u32> {
    match unit.to_ascii_lowercase().as_str() {
        "" => Some(0),
        "k" => Some(10),
        "m" => Some(20),
        "g" => Some(30),
        "t" => Some(40),
        "p" => Some(50),
        "e" => Some(60),
        _ => None,
    }
}

impl TryFrom<String> for QuotaSize {
    type Error = EnforcerError;

    fn try_from(value: String) -> EnforcerResult<Self> {
        Self::parse(&value)
    }
}

impl From<QuotaSize> for String {
    fn from(size: QuotaSize) -> Self {
        size.0
    }
}

impl fmt::Display for QuotaSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Soft and hard block limits for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaLimits {
    pub soft: QuotaSize,
    pub hard: QuotaSize,
}

impl QuotaLimits {
    /// # Errors
    ///
    /// Returns `EnforcerError::SoftAboveHard` if `soft` is larger than a
    /// non-zero `hard`.
    pub fn new(soft: QuotaSize, hard: QuotaSize) -> EnforcerResult<Self> {
        if !hard.is_zero() && soft.bytes() > hard.bytes() {
            return Err(EnforcerError::SoftAboveHard {
                soft: soft.to_string(),
                hard: hard.to_string(),
            });
        }
        Ok(Self { soft, hard })
    }

    /// `"0"`/`"0"`: clears enforcement for a project
    pub fn cleared() -> Self {
        Self {
            soft: QuotaSize::zero(),
            hard: QuotaSize::zero(),
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.soft.is_zero() && self.hard.is_zero()
    }
}
