use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Debit,
    Credit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Debit => f.pad("debit"),
            Direction::Credit => f.pad("credit"),
        }
    }
}

/// A statement row after normalisation, before categorisation and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionCandidate {
    pub date: NaiveDate,
    /// Trimmed, original case.
    pub description: String,
    /// Negative for money leaving the account.
    pub amount: f64,
    pub direction: Direction,
    /// Source row joined with commas, kept for audit.
    pub raw: String,
}

impl TransactionCandidate {
    pub fn debit(date: NaiveDate, description: &str, amount: f64, raw: String) -> Self {
        TransactionCandidate {
            date,
            description: description.trim().to_string(),
            amount: -amount,
            direction: Direction::Debit,
            raw,
        }
    }

    pub fn credit(date: NaiveDate, description: &str, amount: f64, raw: String) -> Self {
        TransactionCandidate {
            date,
            description: description.trim().to_string(),
            amount,
            direction: Direction::Credit,
            raw,
        }
    }

    /// Lower-cased description, the form rules are matched against.
    pub fn folded_description(&self) -> String {
        self.description.to_lowercase()
    }
}
