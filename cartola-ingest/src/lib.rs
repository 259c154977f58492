//! cartola-ingest: classification of free-text bank notifications.
//!
//! The upstream system has no transaction schema. Movements arrive as
//! natural-language push messages, so extraction is rule based: pull a date
//! and an amount out of the text, then classify against an ordered list of
//! template matches.

pub mod notification;
pub mod rules;

pub use notification::{NotificationParser, ParsedMovement};
