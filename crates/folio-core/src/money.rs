//! Integer money arithmetic for line items, tax, and totals.
//!
//! Every amount is a count of currency minor units (pence, cents). Floating
//! point never touches money, so the totals identities hold exactly:
//!
//! - `subtotal == Σ quantity × unit_price`
//! - `tax == round(subtotal × rate)` (half away from zero, to the minor unit)
//! - `total == subtotal + tax`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::LineItem;

/// An amount in currency minor units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Whole major units (e.g. pounds) for a 2-minor-unit currency.
    pub const fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Settlement currency. All supported currencies use 2 minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Gbp,
    Usd,
    Eur,
}

impl Currency {
    /// Lower-case ISO 4217 code, as the payment gateway expects it.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Gbp => "gbp",
            Self::Usd => "usd",
            Self::Eur => "eur",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gbp => "£",
            Self::Usd => "$",
            Self::Eur => "€",
        }
    }

    pub fn minor_units(&self) -> u32 {
        2
    }

    /// Format an amount with the currency symbol, e.g. `£2,310.00`.
    pub fn format(&self, amount: Money) -> String {
        let plain = amount.to_string();
        let (sign, digits) = match plain.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", plain.as_str()),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, "00"));
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        format!("{sign}{}{grouped}.{fraction}", self.symbol())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gbp" => Ok(Self::Gbp),
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// Tax rate held in basis points: `1000` is 10 %, `10_000` is 100 %.
///
/// The wire form is a percentage, so `"tax_rate": 10` means 10 % and
/// `"tax_rate": 17.5` or `"17.5%"` means 17.5 %. Precision beyond a basis
/// point is rounded away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    pub const fn percent(pct: u32) -> Self {
        Self(pct * 100)
    }

    pub const fn basis_points(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 <= Self::MAX_BASIS_POINTS
    }

    /// Tax owed on `subtotal`, rounded half away from zero to the minor unit.
    pub fn apply(self, subtotal: Money) -> Money {
        let scaled = i128::from(subtotal.minor()) * i128::from(self.0);
        let denom = i128::from(Self::MAX_BASIS_POINTS);
        let half = denom / 2;
        let rounded = if scaled >= 0 {
            (scaled + half) / denom
        } else {
            (scaled - half) / denom
        };
        Money(saturate(rounded))
    }
}

impl FromStr for TaxRate {
    type Err = String;

    /// Parse a percentage such as `10`, `17.5` or `20%` without going
    /// through floating point.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim().trim_end_matches('%').trim_end();
        let invalid = || format!("invalid tax rate: {s:?}");
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let whole: u32 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut digits = fraction.bytes().map(|b| u32::from(b - b'0'));
        let hundredths = digits.next().unwrap_or(0) * 10 + digits.next().unwrap_or(0);
        let round_up = digits.next().is_some_and(|d| d >= 5);
        whole
            .checked_mul(100)
            .and_then(|bp| bp.checked_add(hundredths + u32::from(round_up)))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl Serialize for TaxRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0 % 100 == 0 {
            serializer.serialize_u32(self.0 / 100)
        } else {
            serializer.serialize_f64(f64::from(self.0) / 100.0)
        }
    }
}

impl<'de> Deserialize<'de> for TaxRate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Percent {
            Whole(u32),
            Fraction(f64),
            Text(String),
        }

        match Percent::deserialize(deserializer)? {
            Percent::Whole(pct) => pct
                .checked_mul(100)
                .map(Self)
                .ok_or_else(|| serde::de::Error::custom("tax rate out of range")),
            Percent::Fraction(pct) if pct.is_finite() && (0.0..=100.0).contains(&pct) => {
                // Bounded above, so the cast cannot truncate.
                Ok(Self((pct * 100.0).round() as u32))
            }
            Percent::Fraction(pct) => Err(serde::de::Error::custom(format!(
                "tax rate must be a percentage between 0 and 100, got {pct}"
            ))),
            Percent::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 100 == 0 {
            write!(f, "{}%", self.0 / 100)
        } else {
            write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
        }
    }
}

/// Derived totals of a document. Never persisted; recomputed from line items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
}

impl Totals {
    pub fn compute(items: &[LineItem], rate: TaxRate) -> Self {
        let subtotal: i128 = items
            .iter()
            .map(|item| i128::from(item.quantity) * i128::from(item.unit_price.minor()))
            .sum();
        let subtotal = Money(saturate(subtotal));
        let tax = rate.apply(subtotal);
        let total = Money(subtotal.minor().saturating_add(tax.minor()));
        Self {
            subtotal,
            tax,
            total,
        }
    }
}

// Creation-time bounds keep real documents far away from this.
fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}
