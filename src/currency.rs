//! Tax rates and the currency-formatting seam.
//!
//! All monetary values in this crate are integer minor currency units (e.g.
//! cents) until the final formatting step. [`TaxRate`] keeps tax arithmetic
//! in integers too; locale-aware formatting is an external collaborator
//! behind [`CurrencyFormatter`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, SubscriptionError};

/// An exact, non-negative tax rate.
///
/// Stored as an integer rational so applying it to a minor-unit amount never
/// goes through floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate {
    numerator: i64,
    denominator: i64,
}

impl TaxRate {
    /// A zero rate.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            numerator: 0,
            denominator: 1,
        }
    }

    /// Create a rate from an arbitrary rational.
    ///
    /// Fails when the denominator is not positive or the numerator is
    /// negative.
    pub fn new(numerator: i64, denominator: i64) -> Result<Self> {
        if denominator <= 0 {
            return Err(SubscriptionError::invalid_input(format!(
                "tax rate denominator must be positive, got {denominator}"
            )));
        }
        if numerator < 0 {
            return Err(SubscriptionError::invalid_input(format!(
                "tax rate must not be negative, got {numerator}/{denominator}"
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Create a rate from whole percent (20 ⇒ 20%).
    #[must_use]
    pub fn from_percent(percent: u32) -> Self {
        Self {
            numerator: i64::from(percent),
            denominator: 100,
        }
    }

    /// Create a rate from basis points (1950 ⇒ 19.5%).
    #[must_use]
    pub fn from_basis_points(basis_points: u32) -> Self {
        Self {
            numerator: i64::from(basis_points),
            denominator: 10_000,
        }
    }

    /// Tax owed on an amount of minor units, rounded half-up.
    #[must_use]
    pub fn apply(&self, amount_minor: i64) -> i64 {
        (amount_minor * self.numerator + self.denominator / 2) / self.denominator
    }

    /// Check whether the rate is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::zero()
    }
}

/// Locale-aware currency formatting, provided by the surrounding system.
///
/// The locale tables live outside this crate; implementations receive the
/// final integer minor-unit amount and an ISO currency code.
pub trait CurrencyFormatter: Send + Sync {
    /// Format an amount of minor units for display.
    fn format(&self, amount_minor: i64, currency: &str, locale: &str) -> String;
}

impl<F: CurrencyFormatter + ?Sized> CurrencyFormatter for &F {
    fn format(&self, amount_minor: i64, currency: &str, locale: &str) -> String {
        (**self).format(amount_minor, currency, locale)
    }
}

/// Test formatter, kept deliberately locale-blind.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::CurrencyFormatter;

    /// Formats amounts as `"<CODE> <units>.<cents>"`, ignoring the locale.
    ///
    /// Assumes two-decimal currencies, which is all the tests need.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct PlainCurrencyFormatter;

    impl CurrencyFormatter for PlainCurrencyFormatter {
        fn format(&self, amount_minor: i64, currency: &str, _locale: &str) -> String {
            let sign = if amount_minor < 0 { "-" } else { "" };
            let magnitude = amount_minor.unsigned_abs();
            format!(
                "{} {}{}.{:02}",
                currency.to_uppercase(),
                sign,
                magnitude / 100,
                magnitude % 100
            )
        }
    }
}
