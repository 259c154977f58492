//! cartola-core: ledger data model, localized money arithmetic, and totals.

pub mod ledger;
pub mod money;
pub mod totals;

pub use ledger::{Category, DailyLedger, DayMovements, LedgerEntry};
pub use money::Money;
pub use totals::{Totals, day_totals, ledger_totals, totals_by_date};
