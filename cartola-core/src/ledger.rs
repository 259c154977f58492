//! Ledger structures: one classified movement per upstream notification,
//! grouped per date under the three upstream categories.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Movement category. The sign of an amount is implied by the category;
/// entries never store negative magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "abono")]
    Credit,
    #[serde(rename = "gastoDebito")]
    DebitExpense,
    #[serde(rename = "gastoCredito")]
    CreditCardExpense,
}

/// One classified movement, serialized with the upstream wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "mov")]
    pub amount: Money,
    #[serde(rename = "descripcion")]
    pub description: String,
}

impl LedgerEntry {
    pub fn new(amount: Money, description: impl Into<String>) -> Self {
        Self {
            amount,
            description: description.into(),
        }
    }
}

/// Movements of a single date, split by category. Insertion order within
/// each sequence is the order records arrived from upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayMovements {
    pub abonos: Vec<LedgerEntry>,
    #[serde(rename = "gastosDebito")]
    pub gastos_debito: Vec<LedgerEntry>,
    #[serde(rename = "gastosCredito")]
    pub gastos_credito: Vec<LedgerEntry>,
}

impl DayMovements {
    pub fn push(&mut self, category: Category, entry: LedgerEntry) {
        match category {
            Category::Credit => self.abonos.push(entry),
            Category::DebitExpense => self.gastos_debito.push(entry),
            Category::CreditCardExpense => self.gastos_credito.push(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.abonos.len() + self.gastos_debito.len() + self.gastos_credito.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ledger keyed by the literal captured date string (`DD-MM-YYYY`).
///
/// Date keys are never normalized: two spellings of the same calendar day
/// would land in separate buckets. The upstream source is consistent about
/// the format, so this does not happen in practice, but the assumption is
/// deliberate. Dates keep first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyLedger {
    days: IndexMap<String, DayMovements>,
}

impl DailyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: &str, category: Category, entry: LedgerEntry) {
        self.days.entry(date.to_string()).or_default().push(category, entry);
    }

    pub fn day(&self, date: &str) -> Option<&DayMovements> {
        self.days.get(date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DayMovements)> {
        self.days.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of date buckets.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Total number of entries across all dates and categories.
    pub fn entry_count(&self) -> usize {
        self.days.values().map(DayMovements::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(centavos: i64, desc: &str) -> LedgerEntry {
        LedgerEntry::new(Money::from_centavos(centavos), desc)
    }

    #[test]
    fn test_push_routes_by_category() {
        let mut ledger = DailyLedger::new();
        ledger.push("01-05-2024", Category::Credit, entry(1_000_000, "a"));
        ledger.push("01-05-2024", Category::DebitExpense, entry(200_000, "b"));
        ledger.push("01-05-2024", Category::CreditCardExpense, entry(300_000, "c"));

        let day = ledger.day("01-05-2024").unwrap();
        assert_eq!(day.abonos.len(), 1);
        assert_eq!(day.gastos_debito.len(), 1);
        assert_eq!(day.gastos_credito.len(), 1);
        assert_eq!(day.len(), 3);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut ledger = DailyLedger::new();
        ledger.push("02-05-2024", Category::DebitExpense, entry(100, "first"));
        ledger.push("01-05-2024", Category::DebitExpense, entry(200, "second"));
        ledger.push("02-05-2024", Category::DebitExpense, entry(300, "third"));

        let dates: Vec<&str> = ledger.iter().map(|(d, _)| d).collect();
        assert_eq!(dates, vec!["02-05-2024", "01-05-2024"]);

        let day = ledger.day("02-05-2024").unwrap();
        assert_eq!(day.gastos_debito[0].description, "first");
        assert_eq!(day.gastos_debito[1].description, "third");
    }

    #[test]
    fn test_literal_date_keys_do_not_merge() {
        let mut ledger = DailyLedger::new();
        ledger.push("01-05-2024", Category::Credit, entry(100, "a"));
        ledger.push("1-5-2024", Category::Credit, entry(100, "b"));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_wire_serialization() {
        let mut ledger = DailyLedger::new();
        ledger.push(
            "01-05-2024",
            Category::Credit,
            entry(1_000_000, "Transferencia recibida en cuenta 12345"),
        );

        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "01-05-2024": {
                    "abonos": [
                        { "mov": "$ 10.000", "descripcion": "Transferencia recibida en cuenta 12345" }
                    ],
                    "gastosDebito": [],
                    "gastosCredito": []
                }
            })
        );
    }
}
