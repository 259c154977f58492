//! Notification text → zero or one parsed movement.

use cartola_core::{Category, Money};
use regex::Regex;

use crate::rules::{self, Describe};

/// One movement extracted from a notification body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMovement {
    /// Literal date substring (`DD-MM-YYYY`), used as the ledger bucket key.
    pub date: String,
    pub category: Category,
    pub amount: Money,
    pub description: String,
}

/// Parses notification bodies. Compile once, reuse across records.
#[derive(Debug)]
pub struct NotificationParser {
    date_re: Regex,
    amount_re: Regex,
    account_re: Regex,
    merchant_re: Regex,
}

impl NotificationParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            date_re: Regex::new(r"(\d{2}-\d{2}-\d{4})")?,
            amount_re: Regex::new(r"\$\s*([\d.,]+)")?,
            account_re: Regex::new(r"cuenta (\d+)")?,
            merchant_re: Regex::new(r"en ([A-Z\s\*\.]+?),?\s+el\s+\d")?,
        })
    }

    /// Classify and extract a single notification body.
    ///
    /// Returns `None` when the text carries no `DD-MM-YYYY` date or no
    /// parseable `$` amount; those records are dropped, never errors.
    /// Every text that has both yields exactly one movement.
    pub fn parse(&self, text: &str) -> Option<ParsedMovement> {
        let date = self.date_re.captures(text)?.get(1)?.as_str().to_string();
        let raw_amount = self.amount_re.captures(text)?.get(1)?.as_str();
        let amount = Money::parse_localized(raw_amount)?;

        let rule = rules::classify(text);
        let description = match rule.describe {
            Describe::Account { prefix, fallback } => self
                .account_re
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|n| format!("{prefix} {}", n.as_str()))
                .unwrap_or_else(|| fallback.to_string()),
            Describe::Merchant { fallback } => self
                .merchant_re
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| fallback.to_string()),
            Describe::Fixed(s) => s.to_string(),
        };

        Some(ParsedMovement {
            date,
            category: rule.category,
            amount,
            description,
        })
    }
}
