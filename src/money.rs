use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// ISO-4217-ish currency code, plus `Gbx` for UK pence (a distinct unit from
/// `Gbp`, not a fraction of it, so callers never silently mix the two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    Usd,
    Gbp,
    Gbx,
    Eur,
}

impl Currency {
    pub fn symbol(self) -> &'static str {
        match self {
            Currency::Usd => "$",
            Currency::Gbp => "£",
            Currency::Gbx => "p",
            Currency::Eur => "€",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Gbp => "GBP",
            Currency::Gbx => "GBX",
            Currency::Eur => "EUR",
        }
    }

    pub fn parse(code: &str) -> Option<Currency> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "GBP" => Some(Currency::Gbp),
            "GBX" | "GBP_PENCE" | "PENCE" => Some(Currency::Gbx),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Exact-decimal monetary value. Never constructed from a binary float;
/// ingestion paths parse strings or convert from `Decimal` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Money { amount, currency }
    }

    pub fn from_str_amount(amount: &str, currency: Currency) -> Result<Self, rust_decimal::Error> {
        Ok(Money::new(Decimal::from_str(amount)?, currency))
    }

    pub fn zero(currency: Currency) -> Self {
        Money::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Checked addition; `None` on currency mismatch rather than silently
    /// producing a wrong value.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount + other.amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount - other.amount, self.currency))
    }

    /// Percentage change relative to `self`: `(other - self) / self`.
    pub fn pct_change(&self, other: &Money) -> Option<Decimal> {
        if self.currency != other.currency || self.amount.is_zero() {
            return None;
        }
        Some((other.amount - self.amount) / self.amount)
    }

    /// Converts GBX (pence) to GBP (pounds) with exact decimal division.
    pub fn pence_to_pounds(&self) -> Option<Money> {
        if self.currency != Currency::Gbx {
            return None;
        }
        Some(Money::new(self.amount / Decimal::from(100), Currency::Gbp))
    }

    /// Converts GBP (pounds) to GBX (pence) with exact decimal multiplication.
    pub fn pounds_to_pence(&self) -> Option<Money> {
        if self.currency != Currency::Gbp {
            return None;
        }
        Some(Money::new(self.amount * Decimal::from(100), Currency::Gbx))
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        self.checked_add(&rhs)
            .expect("Money::add called on mismatched currencies")
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        self.checked_sub(&rhs)
            .expect("Money::sub called on mismatched currencies")
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:.2}", self.currency.symbol(), self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pence_pounds_round_trip() {
        let pounds = Money::from_str_amount("152.34", Currency::Gbp).unwrap();
        let pence = pounds.pounds_to_pence().unwrap();
        let back = pence.pence_to_pounds().unwrap();
        assert_eq!(pounds, back);
    }

    #[test]
    fn mismatched_currency_add_is_none() {
        let usd = Money::from_str_amount("10", Currency::Usd).unwrap();
        let gbp = Money::from_str_amount("10", Currency::Gbp).unwrap();
        assert!(usd.checked_add(&gbp).is_none());
    }

    #[test]
    fn display_formats_two_decimals() {
        let m = Money::from_str_amount("1", Currency::Usd).unwrap();
        assert_eq!(format!("{}", m), "$1.00");
    }
}
