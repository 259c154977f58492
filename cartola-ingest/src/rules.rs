//! Ordered classification rules for notification text.
//!
//! Evaluation is strictly top to bottom and the first matching rule wins;
//! the ordering is a tie-break contract (a text mentioning both a received
//! transfer and a credit card classifies as the transfer). Texts matching
//! no rule fall into the default debit-expense bucket; unknown movement
//! types are never dropped.

use cartola_core::Category;

/// How a rule derives the entry description from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Describe {
    /// `"{prefix} {account_number}"` from a trailing `cuenta <digits>`
    /// pattern, or the fallback when no account number is present.
    Account {
        prefix: &'static str,
        fallback: &'static str,
    },
    /// Merchant name between `en ` and `, el <digit>`, trimmed, or the
    /// fallback when the pattern does not match.
    Merchant { fallback: &'static str },
    /// A fixed description.
    Fixed(&'static str),
}

/// One classification rule: substring match, target category, description
/// strategy.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub needle: &'static str,
    pub category: Category,
    pub describe: Describe,
}

/// The rule table, in priority order.
pub const RULES: &[Rule] = &[
    Rule {
        needle: "Transferencia hacia",
        category: Category::Credit,
        describe: Describe::Account {
            prefix: "Transferencia recibida en cuenta",
            fallback: "Transferencia recibida",
        },
    },
    Rule {
        needle: "Tarjeta de Débito",
        category: Category::DebitExpense,
        describe: Describe::Merchant {
            fallback: "Compra con tarjeta de débito",
        },
    },
    Rule {
        needle: "Tarjeta de Crédito",
        category: Category::CreditCardExpense,
        describe: Describe::Merchant {
            fallback: "Compra con tarjeta de crédito",
        },
    },
    Rule {
        needle: "Transferencia desde",
        category: Category::DebitExpense,
        describe: Describe::Account {
            prefix: "Transferencia enviada desde cuenta",
            fallback: "Transferencia enviada",
        },
    },
    Rule {
        needle: "pago de tu TC",
        category: Category::DebitExpense,
        describe: Describe::Fixed("Pago de tarjeta de crédito"),
    },
];

/// Applied when no rule in [`RULES`] matches.
pub const FALLBACK: Rule = Rule {
    needle: "",
    category: Category::DebitExpense,
    describe: Describe::Fixed("Movimiento"),
};

/// First rule whose needle occurs in `text`, or the fallback.
pub fn classify(text: &str) -> &'static Rule {
    RULES
        .iter()
        .find(|rule| text.contains(rule.needle))
        .unwrap_or(&FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_needle_hits_its_rule() {
        assert_eq!(classify("Transferencia hacia cuenta 1").category, Category::Credit);
        assert_eq!(
            classify("Compra Tarjeta de Débito en X").category,
            Category::DebitExpense
        );
        assert_eq!(
            classify("Compra Tarjeta de Crédito en X").category,
            Category::CreditCardExpense
        );
        assert_eq!(
            classify("Transferencia desde cuenta 2").category,
            Category::DebitExpense
        );
        assert_eq!(classify("pago de tu TC procesado").category, Category::DebitExpense);
    }

    #[test]
    fn test_unmatched_text_falls_back() {
        let rule = classify("Giro en cajero");
        assert_eq!(rule.category, Category::DebitExpense);
        assert_eq!(rule.describe, Describe::Fixed("Movimiento"));
    }

    #[test]
    fn test_earlier_rule_wins_ties() {
        // Mentions both a received transfer and a credit card; the transfer
        // rule is earlier in the table and must govern.
        let text = "Transferencia hacia tu Tarjeta de Crédito";
        assert_eq!(classify(text).category, Category::Credit);
    }
}
