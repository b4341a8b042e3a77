//! Money in integer minor units.
//!
//! Every amount that crosses a boundary in this workspace (cart lines,
//! shipping rates, payment intent amounts, order rows) is an integer count of
//! the currency's smallest unit. Decimal arithmetic is only used for display.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An amount in minor units (cents for EUR, whole francs for XPF).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero minor units.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Returns true if the amount is exactly zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Add, saturating at the numeric bounds.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Subtract, saturating at zero.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        let diff = self.0.saturating_sub(other.0);
        if diff < 0 { Self::ZERO } else { Self(diff) }
    }

    /// Convert to major units for display in the given currency.
    #[must_use]
    pub fn to_major(self, currency: CurrencyCode) -> Decimal {
        Decimal::new(self.0, currency.exponent())
    }

    /// Format for display, e.g. `"42.50 EUR"` or `"3500 XPF"`.
    #[must_use]
    pub fn display(self, currency: CurrencyCode) -> String {
        format!("{} {}", self.to_major(currency), currency.code())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(rhs)))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// ISO 4217 currency codes accepted by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CurrencyCode {
    #[default]
    Eur,
    Xpf,
    Usd,
    Aud,
    Nzd,
    Jpy,
}

impl CurrencyCode {
    /// Upper-case ISO code, e.g. `"EUR"`.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Eur => "EUR",
            Self::Xpf => "XPF",
            Self::Usd => "USD",
            Self::Aud => "AUD",
            Self::Nzd => "NZD",
            Self::Jpy => "JPY",
        }
    }

    /// Lower-case code as used by the payment processor API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eur => "eur",
            Self::Xpf => "xpf",
            Self::Usd => "usd",
            Self::Aud => "aud",
            Self::Nzd => "nzd",
            Self::Jpy => "jpy",
        }
    }

    /// Number of decimal places between minor and major units.
    #[must_use]
    pub const fn exponent(self) -> u32 {
        match self {
            Self::Xpf | Self::Jpy => 0,
            Self::Eur | Self::Usd | Self::Aud | Self::Nzd => 2,
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eur" => Ok(Self::Eur),
            "xpf" => Ok(Self::Xpf),
            "usd" => Ok(Self::Usd),
            "aud" => Ok(Self::Aud),
            "nzd" => Ok(Self::Nzd),
            "jpy" => Ok(Self::Jpy),
            _ => Err(format!("unsupported currency: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_and_total() {
        let lines = [Money::from_minor(100), Money::from_minor(100), Money::from_minor(50)];
        assert_eq!(lines.iter().sum::<Money>(), Money::from_minor(250));
    }

    #[test]
    fn test_saturating_sub_never_negative() {
        assert_eq!(
            Money::from_minor(100).saturating_sub(Money::from_minor(300)),
            Money::ZERO
        );
    }

    #[test]
    fn test_display_respects_exponent() {
        assert_eq!(Money::from_minor(4250).display(CurrencyCode::Eur), "42.50 EUR");
        assert_eq!(Money::from_minor(3500).display(CurrencyCode::Xpf), "3500 XPF");
    }

    #[test]
    fn test_currency_from_str_case_insensitive() {
        assert_eq!("EUR".parse::<CurrencyCode>().unwrap(), CurrencyCode::Eur);
        assert_eq!(" xpf ".parse::<CurrencyCode>().unwrap(), CurrencyCode::Xpf);
        assert!("btc".parse::<CurrencyCode>().is_err());
    }

    #[test]
    fn test_currency_serde_lowercase() {
        assert_eq!(serde_json::to_string(&CurrencyCode::Eur).unwrap(), "\"eur\"");
    }
}
