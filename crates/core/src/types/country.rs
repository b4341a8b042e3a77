//! ISO 3166-1 alpha-2 country codes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CountryCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CountryCodeError {
    #[error("country code must be exactly two letters, got {0:?}")]
    Invalid(String),
}

/// A two-letter country code, stored upper-case.
///
/// Any syntactically valid code is accepted; codes that no shipping zone
/// lists resolve to the rest-of-world zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// French Polynesia, the store's home country.
    pub const PF: Self = Self(*b"PF");

    /// Parse a code, ignoring case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`CountryCodeError::Invalid`] unless the trimmed input is two
    /// ASCII letters.
    pub fn parse(s: &str) -> Result<Self, CountryCodeError> {
        match s.trim().as_bytes() {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                Ok(Self([a.to_ascii_uppercase(), b.to_ascii_uppercase()]))
            }
            _ => Err(CountryCodeError::Invalid(s.to_owned())),
        }
    }

    /// The code as an upper-case string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII letters by construction
        core::str::from_utf8(&self.0).unwrap_or("ZZ")
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CountryCode {
    type Err = CountryCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.as_str().to_owned()
    }
}
