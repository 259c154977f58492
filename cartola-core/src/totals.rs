//! Per-date and global sums over a ledger.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::ledger::{DailyLedger, DayMovements, LedgerEntry};
use crate::money::Money;

fn pesos<S: Serializer>(m: &Money, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(m.to_pesos())
}

/// Aggregate of one date (or of the whole ledger). Serialized as numeric
/// pesos under the upstream field names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Totals {
    #[serde(rename = "totalAbonos", serialize_with = "pesos")]
    pub total_abonos: Money,
    #[serde(rename = "totalGastosDebito", serialize_with = "pesos")]
    pub total_gastos_debito: Money,
    #[serde(rename = "totalGastosCredito", serialize_with = "pesos")]
    pub total_gastos_credito: Money,
    #[serde(rename = "totalGastos", serialize_with = "pesos")]
    pub total_gastos: Money,
    #[serde(serialize_with = "pesos")]
    pub balance: Money,
}

impl Totals {
    /// `total_gastos` and `balance` are derived, never supplied.
    pub fn new(abonos: Money, gastos_debito: Money, gastos_credito: Money) -> Self {
        let total_gastos = gastos_debito + gastos_credito;
        Totals {
            total_abonos: abonos,
            total_gastos_debito: gastos_debito,
            total_gastos_credito: gastos_credito,
            total_gastos,
            balance: abonos - total_gastos,
        }
    }
}

fn sum(entries: &[LedgerEntry]) -> Money {
    entries.iter().map(|e| e.amount).sum()
}

/// Totals of a single date bucket.
pub fn day_totals(day: &DayMovements) -> Totals {
    Totals::new(
        sum(&day.abonos),
        sum(&day.gastos_debito),
        sum(&day.gastos_credito),
    )
}

/// Global totals over every date. An empty ledger yields all zeroes and a
/// zero balance.
pub fn ledger_totals(ledger: &DailyLedger) -> Totals {
    let mut abonos = Money::ZERO;
    let mut debito = Money::ZERO;
    let mut credito = Money::ZERO;
    for (_, day) in ledger.iter() {
        abonos += sum(&day.abonos);
        debito += sum(&day.gastos_debito);
        credito += sum(&day.gastos_credito);
    }
    Totals::new(abonos, debito, credito)
}

/// Per-date totals, in the ledger's date order.
pub fn totals_by_date(ledger: &DailyLedger) -> IndexMap<String, Totals> {
    ledger
        .iter()
        .map(|(date, day)| (date.to_string(), day_totals(day)))
        .collect()
}
