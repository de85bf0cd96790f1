//! Cached Value Module
//!
//! Defines `Arbitrary`, the value type the cache stores, including the exotic
//! kinds JSON cannot express on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

// == Big Integer ==
/// Arbitrary-precision integer kept in canonical decimal form.
///
/// Canonical means: an optional leading `-`, no leading zeros, and zero is
/// never negative. Two values are equal iff their magnitudes and signs match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInteger {
    negative: bool,
    digits: String,
}

impl BigInteger {
    /// Returns true if the value is below zero.
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Returns the value as an `i128` when it fits.
    pub fn to_i128(&self) -> Option<i128> {
        self.to_string().parse().ok()
    }
}

impl FromStr for BigInteger {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };

        if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CacheError::Deserialization(format!(
                "invalid big integer literal '{}'",
                s
            )));
        }

        let trimmed = body.trim_start_matches('0');
        let digits = if trimmed.is_empty() { "0" } else { trimmed };

        Ok(Self {
            negative: negative && digits != "0",
            digits: digits.to_string(),
        })
    }
}

impl fmt::Display for BigInteger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.digits)
        } else {
            f.write_str(&self.digits)
        }
    }
}

impl From<i64> for BigInteger {
    fn from(value: i64) -> Self {
        Self::from(value as i128)
    }
}

impl From<u64> for BigInteger {
    fn from(value: u64) -> Self {
        Self::from(value as u128)
    }
}

impl From<i128> for BigInteger {
    fn from(value: i128) -> Self {
        Self {
            negative: value < 0,
            digits: value.unsigned_abs().to_string(),
        }
    }
}

impl From<u128> for BigInteger {
    fn from(value: u128) -> Self {
        Self {
            negative: false,
            digits: value.to_string(),
        }
    }
}

// == Arbitrary ==
/// Any value the cache can hold.
///
/// The first six variants map directly onto JSON. The last four are the
/// exotic kinds that need a tagged wrapper to survive a round trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Arbitrary {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Arbitrary>),
    Object(BTreeMap<String, Arbitrary>),
    /// Integer beyond the 2^53 safe range of a JSON number
    BigInt(BigInteger),
    /// Absolute point in time
    Timestamp(DateTime<Utc>),
    /// Ordered key -> value association, insertion order preserved
    Map(Vec<(Arbitrary, Arbitrary)>),
    /// Collection of unique elements, insertion order preserved
    Set(Vec<Arbitrary>),
}

impl Arbitrary {
    // == Ordered Map ==
    /// Builds an ordered association.
    ///
    /// A repeated key keeps its first position and takes the last value.
    pub fn map<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Arbitrary, Arbitrary)>,
    {
        let mut out: Vec<(Arbitrary, Arbitrary)> = Vec::new();
        for (key, value) in pairs {
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => out.push((key, value)),
            }
        }
        Arbitrary::Map(out)
    }

    // == Unique Set ==
    /// Builds a unique-element collection, dropping later duplicates.
    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Arbitrary>,
    {
        let mut out: Vec<Arbitrary> = Vec::new();
        for item in items {
            if !out.contains(&item) {
                out.push(item);
            }
        }
        Arbitrary::Set(out)
    }

    /// Builds a plain object from string keys.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Arbitrary)>,
        K: Into<String>,
    {
        Arbitrary::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arbitrary::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arbitrary::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arbitrary::Null)
    }
}

impl From<bool> for Arbitrary {
    fn from(value: bool) -> Self {
        Arbitrary::Bool(value)
    }
}

impl From<f64> for Arbitrary {
    fn from(value: f64) -> Self {
        Arbitrary::Number(value)
    }
}

impl From<i32> for Arbitrary {
    fn from(value: i32) -> Self {
        Arbitrary::Number(value as f64)
    }
}

impl From<&str> for Arbitrary {
    fn from(value: &str) -> Self {
        Arbitrary::String(value.to_string())
    }
}

impl From<String> for Arbitrary {
    fn from(value: String) -> Self {
        Arbitrary::String(value)
    }
}

impl From<BigInteger> for Arbitrary {
    fn from(value: BigInteger) -> Self {
        Arbitrary::BigInt(value)
    }
}

impl From<DateTime<Utc>> for Arbitrary {
    fn from(value: DateTime<Utc>) -> Self {
        Arbitrary::Timestamp(value)
    }
}

impl From<Vec<Arbitrary>> for Arbitrary {
    fn from(value: Vec<Arbitrary>) -> Self {
        Arbitrary::Array(value)
    }
}
