//! Fixed-length numeric identifiers and the retry policy used to generate them.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_ID_FALLBACK_PROBES, DEFAULT_ID_MAX_ATTEMPTS, USER_ID_DIGITS};
use crate::error::CoreError;
use crate::schema::validate_all;

/// Largest digit count whose range still fits comfortably in a `u64`.
const MAX_DIGITS: u32 = 18;

/// Decimal identifier of exactly `digits` digits with a non-zero leading digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawIdFormat")]
pub struct IdFormat {
    digits: u32,
}

#[derive(Deserialize)]
struct RawIdFormat {
    digits: u32,
}

impl TryFrom<RawIdFormat> for IdFormat {
    type Error = CoreError;

    fn try_from(raw: RawIdFormat) -> Result<Self, CoreError> {
        Self::new(raw.digits)
    }
}

impl IdFormat {
    pub fn new(digits: u32) -> Result<Self, CoreError> {
        if digits == 0 || digits > MAX_DIGITS {
            return Err(CoreError::InvalidFormat(format!(
                "identifier length must be 1..={MAX_DIGITS} digits, got {digits}"
            )));
        }
        Ok(Self { digits })
    }

    /// The 10-digit format used for `users.user_id`.
    #[must_use]
    pub const fn user_id() -> Self {
        Self { digits: USER_ID_DIGITS }
    }

    #[must_use]
    pub const fn digits(&self) -> u32 {
        self.digits
    }

    #[must_use]
    pub const fn min(&self) -> u64 {
        10u64.pow(self.digits - 1)
    }

    #[must_use]
    pub const fn max(&self) -> u64 {
        10u64.pow(self.digits) - 1
    }

    #[must_use]
    pub const fn range(&self) -> RangeInclusive<u64> {
        self.min()..=self.max()
    }

    /// Number of distinct values the format can express.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.max() - self.min() + 1
    }

    /// Render a value that lies inside [`IdFormat::range`].
    #[must_use]
    pub fn render(&self, value: u64) -> String {
        debug_assert!(self.range().contains(&value), "{value} outside {:?}", self.range());
        value.to_string()
    }

    /// Whether `candidate` is a well-formed identifier of this format.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.len() == self.digits as usize
            && candidate.bytes().all(|b| b.is_ascii_digit())
            && !candidate.starts_with('0')
    }

    /// Deterministic fallback candidate number `offset` for a clock seed.
    ///
    /// The seed is reduced to the format's lowest-order digits and mapped into
    /// range, then probed linearly: consecutive offsets give consecutive
    /// values, wrapping from [`IdFormat::max`] back to [`IdFormat::min`].
    #[must_use]
    pub fn fallback_candidate(&self, seed: u64, offset: u64) -> u64 {
        let low_digits = seed % 10u64.pow(self.digits);
        let capacity = self.capacity();
        let slot = (low_digits % capacity + offset % capacity) % capacity;
        self.min() + slot
    }
}

impl fmt::Display for IdFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-digit numeric", self.digits)
    }
}

/// Bounded, backoff-free retry policy for identifier generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Random draws before switching to the deterministic fallback. Also caps
    /// how often a write that loses a uniqueness race is retried.
    pub max_attempts: u32,
    /// Linear probes the fallback may make before the pass fails.
    pub fallback_probes: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, fallback_probes: u32) -> Self {
        Self { max_attempts, fallback_probes }
    }

    /// Upper bound on store lookups for one generated value.
    #[must_use]
    pub const fn total_budget(&self) -> u64 {
        self.max_attempts as u64 + self.fallback_probes as u64
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ID_MAX_ATTEMPTS, DEFAULT_ID_FALLBACK_PROBES)
    }
}

/// Where generated identifiers live: `table.column`, rows addressed by `key_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierTarget {
    pub table: String,
    pub key_column: String,
    pub column: String,
    pub format: IdFormat,
}

impl IdentifierTarget {
    pub fn new(
        table: impl Into<String>,
        key_column: impl Into<String>,
        column: impl Into<String>,
        format: IdFormat,
    ) -> Self {
        Self { table: table.into(), key_column: key_column.into(), column: column.into(), format }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_all([self.table.as_str(), self.key_column.as_str(), self.column.as_str()])
    }
}

impl fmt::Display for IdentifierTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Outcome of one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// `(row key, identifier)` in the order they were written.
    pub assigned: Vec<(String, String)>,
    /// Rows another writer filled between selection and update.
    pub skipped: Vec<String>,
}
