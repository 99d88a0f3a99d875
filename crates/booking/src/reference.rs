//! Booking reference codes.
//!
//! A reference is `<prefix><yymmdd><nnnn>`: a short fixed prefix, the
//! creation date, and a zero-padded random suffix in `0001..=9999`. Codes are
//! checked for uniqueness before use; running out of attempts is surfaced as
//! an error rather than degraded.

use core::str::FromStr;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use busline_core::{DomainError, ValueObject};

pub const DEFAULT_PREFIX: &str = "BK";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const SUFFIX_MAX: u32 = 9_999;
const MAX_REFERENCE_LEN: usize = 32;

/// Globally unique, immutable booking code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingReference(String);

impl ValueObject for BookingReference {}

impl BookingReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for BookingReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BookingReference {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > MAX_REFERENCE_LEN {
            return Err(DomainError::validation(format!(
                "booking reference must be 1-{MAX_REFERENCE_LEN} characters"
            )));
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(format!(
                "booking reference '{s}' contains invalid characters"
            )));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for BookingReference {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BookingReference> for String {
    fn from(value: BookingReference) -> Self {
        value.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// Every candidate collided; the reference space for the day is nearly
    /// full or the uniqueness check is broken.
    #[error("could not generate a unique booking reference after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The uniqueness check itself failed.
    #[error("reference uniqueness check failed: {0}")]
    Lookup(String),
}

/// Mints booking references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceGenerator {
    prefix: String,
    max_attempts: u32,
}

impl Default for ReferenceGenerator {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>, max_attempts: u32) -> Result<Self, DomainError> {
        let prefix = prefix.into().trim().to_ascii_uppercase();
        if prefix.is_empty() || prefix.len() > 8 || !prefix.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DomainError::validation(
                "reference prefix must be 1-8 ASCII letters",
            ));
        }
        if max_attempts == 0 {
            return Err(DomainError::validation("reference attempts must be positive"));
        }
        Ok(Self {
            prefix,
            max_attempts,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Shared leading segment of every code minted on `date`.
    pub fn day_prefix(&self, date: NaiveDate) -> String {
        format!("{}{}", self.prefix, date.format("%y%m%d"))
    }

    /// One unchecked candidate.
    pub fn candidate<R: Rng + ?Sized>(&self, date: NaiveDate, rng: &mut R) -> BookingReference {
        let suffix: u32 = rng.gen_range(1..=SUFFIX_MAX);
        BookingReference(format!("{}{suffix:04}", self.day_prefix(date)))
    }

    /// Draw candidates until `is_taken` reports a free one.
    pub fn generate<R, F, E>(
        &self,
        date: NaiveDate,
        rng: &mut R,
        mut is_taken: F,
    ) -> Result<BookingReference, ReferenceError>
    where
        R: Rng + ?Sized,
        F: FnMut(&BookingReference) -> Result<bool, E>,
        E: core::fmt::Display,
    {
        for _ in 0..self.max_attempts {
            let candidate = self.candidate(date, rng);
            let taken = is_taken(&candidate).map_err(|e| ReferenceError::Lookup(e.to_string()))?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(ReferenceError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 3, 7).unwrap()
    }

    #[test]
    fn format_is_prefix_date_suffix() {
        let generator = ReferenceGenerator::default();
        let mut rng = StdRng::seed_from_u64(7);
        let reference = generator.candidate(date(), &mut rng);
        let s = reference.as_str();
        assert_eq!(s.len(), 2 + 6 + 4);
        assert!(s.starts_with("BK300307"));
        let suffix: u32 = s[8..].parse().unwrap();
        assert!((1..=9_999).contains(&suffix));
    }

    #[test]
    fn skips_taken_candidates() {
        let generator = ReferenceGenerator::default();
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = 0;
        let reference = generator
            .generate(date(), &mut rng, |_| {
                seen += 1;
                Ok::<_, String>(seen < 3)
            })
            .unwrap();
        assert_eq!(seen, 3);
        assert!(reference.as_str().starts_with("BK300307"));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let generator = ReferenceGenerator::new("rr", 10).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut calls = 0;
        let err = generator
            .generate(date(), &mut rng, |_| {
                calls += 1;
                Ok::<_, String>(true)
            })
            .unwrap_err();
        assert_eq!(err, ReferenceError::Exhausted { attempts: 10 });
        assert_eq!(calls, 10);
    }

    #[test]
    fn lookup_failures_propagate() {
        let generator = ReferenceGenerator::default();
        let mut rng = StdRng::seed_from_u64(1);
        let err = generator
            .generate(date(), &mut rng, |_| Err::<bool, _>("db down"))
            .unwrap_err();
        assert_eq!(err, ReferenceError::Lookup("db down".into()));
    }

    #[test]
    fn generated_codes_avoid_an_existing_set() {
        let generator = ReferenceGenerator::default();
        let mut rng = StdRng::seed_from_u64(9);
        let mut taken: HashSet<BookingReference> = HashSet::new();
        for _ in 0..200 {
            let r = generator
                .generate(date(), &mut rng, |c| Ok::<_, String>(taken.contains(c)))
                .unwrap();
            assert!(taken.insert(r));
        }
    }

    #[test]
    fn parsing_normalises_case() {
        let r: BookingReference = " bk3003070042 ".parse().unwrap();
        assert_eq!(r.as_str(), "BK3003070042");
        assert!("BK-1".parse::<BookingReference>().is_err());
        assert!("".parse::<BookingReference>().is_err());
    }

    #[test]
    fn prefix_must_be_letters() {
        assert!(ReferenceGenerator::new("B1", 10).is_err());
        assert!(ReferenceGenerator::new("BK", 0).is_err());
        assert_eq!(ReferenceGenerator::new("rr", 3).unwrap().prefix(), "RR");
    }
}
