//! Fixed-point money. Upstream amounts are localized strings (`.` as the
//! thousands separator, `,` as the decimal separator); summing them as floats
//! drifts on large statements, so everything here is integer centavos.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A monetary magnitude in minor units (centavos).
///
/// Signed so that balances can go negative; parsed amounts are always
/// non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_centavos(centavos: i64) -> Self {
        Money(centavos)
    }

    pub fn centavos(self) -> i64 {
        self.0
    }

    /// Parse a localized amount such as `"10.000"`, `"1.234,56"` or
    /// `"$ 10.000"`. A leading `$` and surrounding whitespace are tolerated.
    /// Returns `None` for anything that is not a plain localized number
    /// (more than two decimal digits, stray characters, empty input).
    pub fn parse_localized(raw: &str) -> Option<Money> {
        let s = raw.trim().trim_start_matches('$').trim();
        if s.is_empty() {
            return None;
        }

        let (int_part, dec_part) = match s.split_once(',') {
            Some((i, d)) => (i, d),
            None => (s, ""),
        };

        let digits: String = int_part.chars().filter(|c| *c != '.').collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let whole: i64 = digits.parse().ok()?;

        let centavos = match dec_part.len() {
            0 => 0,
            1 => dec_part.parse::<i64>().ok()? * 10,
            2 => dec_part.parse::<i64>().ok()?,
            _ => return None,
        };

        Some(Money(whole.checked_mul(100)? + centavos))
    }

    /// Value in pesos, for numeric JSON output. Exact while the magnitude
    /// stays below 2^53 centavos.
    pub fn to_pesos(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    /// Renders the upstream wire format: `$ 10.000` or `$ 1.234,56`.
    /// The decimal part is omitted when it is zero, matching how the
    /// upstream notifications write whole amounts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / 100;
        let centavos = abs % 100;

        let raw = whole.to_string();
        let mut grouped = String::with_capacity(raw.len() + raw.len() / 3);
        for (i, ch) in raw.chars().enumerate() {
            if i > 0 && (raw.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }

        let sign = if negative { "-" } else { "" };
        if centavos == 0 {
            write!(f, "$ {sign}{grouped}")
        } else {
            write!(f, "$ {sign}{grouped},{centavos:02}")
        }
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a localized amount string like \"$ 1.234,56\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                Money::parse_localized(v)
                    .ok_or_else(|| E::custom(format!("unparseable amount: {v:?}")))
            }
        }

        deserializer.deserialize_str(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_thousands_separators() {
        assert_eq!(Money::parse_localized("10.000"), Some(Money(1_000_000)));
        assert_eq!(Money::parse_localized("$ 10.000"), Some(Money(1_000_000)));
        assert_eq!(Money::parse_localized("1.234.567"), Some(Money(123_456_700)));
    }

    #[test]
    fn test_parses_decimal_comma() {
        assert_eq!(Money::parse_localized("1.234,56"), Some(Money(123_456)));
        assert_eq!(Money::parse_localized("0,5"), Some(Money(50)));
        assert_eq!(Money::parse_localized("12,05"), Some(Money(1_205)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(Money::parse_localized(""), None);
        assert_eq!(Money::parse_localized("$"), None);
        assert_eq!(Money::parse_localized("abc"), None);
        assert_eq!(Money::parse_localized("1,234"), None); // 3 decimal digits
        assert_eq!(Money::parse_localized("12a.00"), None);
    }

    #[test]
    fn test_display_round_trips_wire_format() {
        assert_eq!(Money(1_000_000).to_string(), "$ 10.000");
        assert_eq!(Money(123_456).to_string(), "$ 1.234,56");
        assert_eq!(Money(50).to_string(), "$ 0,50");
        assert_eq!(Money(-200_000).to_string(), "$ -2.000");
    }

    #[test]
    fn test_sum_is_exact() {
        // 0.1 + 0.2 style cases that drift under f64
        let parts = vec![Money(10), Money(20), Money(1)];
        let total: Money = parts.into_iter().sum();
        assert_eq!(total, Money(31));
        assert_eq!(total.to_pesos(), 0.31);
    }

    #[test]
    fn test_serde_string_representation() {
        let m = Money(1_000_000);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, "\"$ 10.000\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
