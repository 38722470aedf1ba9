//! Currency codes and currency pairs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FxError, FxResult};

/// ISO 4217 currency code, always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code without validation.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Create a currency, rejecting anything that is not three ASCII letters.
    pub fn parse(code: &str) -> FxResult<Self> {
        let currency = Self::new(code);
        if currency.is_valid() {
            Ok(currency)
        } else {
            Err(FxError::InvalidCurrency(code.to_string()))
        }
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Check the code is three uppercase ASCII letters.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 3 && self.0.chars().all(|c| c.is_ascii_uppercase())
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn jpy() -> Self {
        Self::new("JPY")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl FromStr for Currency {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A directed currency pair: one unit of `base` expressed in `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the unit being converted).
    pub base: Currency,
    /// Quote currency (what one unit of base is worth in).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// Parse and validate both legs of a pair.
    pub fn parse(base: &str, quote: &str) -> FxResult<Self> {
        Ok(Self::new(Currency::parse(base)?, Currency::parse(quote)?))
    }

    /// Whether base and quote are the same currency.
    pub fn is_identity(&self) -> bool {
        self.base == self.quote
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_is_uppercased() {
        assert_eq!(Currency::new("usd").code(), "USD");
        assert_eq!(Currency::new(" eur ").code(), "EUR");
    }

    #[test]
    fn test_currency_parse_validation() {
        assert!(Currency::parse("gbp").is_ok());
        assert!(matches!(Currency::parse("US"), Err(FxError::InvalidCurrency(_))));
        assert!(matches!(Currency::parse("USDT"), Err(FxError::InvalidCurrency(_))));
        assert!(matches!(Currency::parse("U5D"), Err(FxError::InvalidCurrency(_))));
    }

    #[test]
    fn test_pair_identity_and_inverse() {
        let pair = CurrencyPair::new(Currency::usd(), Currency::eur());
        assert!(!pair.is_identity());
        assert_eq!(pair.inverse(), CurrencyPair::new(Currency::eur(), Currency::usd()));
        assert_eq!(pair.to_string(), "USD/EUR");

        let same = CurrencyPair::parse("jpy", "JPY").unwrap();
        assert!(same.is_identity());
    }
}
