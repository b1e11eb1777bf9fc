use cashlens_core::{AmountLayout, Bank, BankSchema, TransactionCandidate};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::detect::detect_bank;
use crate::normalize::{parse_amount, parse_date, NormalizeError};
use crate::ImportError;

const SUMMARY_KEYWORDS: &[&str] = &["total", "summary", "opening balance", "closing balance"];

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("column '{0}' not found")]
    MissingColumn(&'static str),
    #[error(transparent)]
    Field(#[from] NormalizeError),
    #[error("both debit and credit are zero")]
    NoAmount,
    #[error("invalid Dr/Cr indicator: {0}")]
    InvalidDirection(String),
}

/// A dropped row. `row` is 1-based and counts the header as row 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWarning {
    pub row: usize,
    pub error: RowError,
}

#[derive(Debug, Clone)]
pub struct ParseReport {
    pub bank: Bank,
    pub transactions: Vec<TransactionCandidate>,
    pub skipped: Vec<RowWarning>,
}

/// A schema column resolved against one header row.
#[derive(Debug, Clone, Copy)]
struct Column {
    name: &'static str,
    index: Option<usize>,
}

impl Column {
    fn resolve(name: &'static str, index: &HashMap<String, usize>) -> Self {
        Column {
            name,
            index: index.get(&name.to_lowercase()).copied(),
        }
    }

    /// Cells past the end of a short row read as blank.
    fn read<'a>(&self, row: &'a [String]) -> Result<&'a str, RowError> {
        let idx = self.index.ok_or(RowError::MissingColumn(self.name))?;
        Ok(row.get(idx).map(String::as_str).unwrap_or(""))
    }
}

enum AmountColumns {
    Separate { debit: Column, credit: Column },
    Indicator { amount: Column, direction: Column },
}

struct RowReader {
    date: Column,
    description: Column,
    amounts: AmountColumns,
}

impl RowReader {
    fn new(schema: &BankSchema, headers: &[String]) -> Self {
        let mut index = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            index.entry(h.trim().to_lowercase()).or_insert(i);
        }

        let amounts = match schema.amounts {
            AmountLayout::Separate { debit, credit } => AmountColumns::Separate {
                debit: Column::resolve(debit, &index),
                credit: Column::resolve(credit, &index),
            },
            AmountLayout::Indicator { amount, direction } => AmountColumns::Indicator {
                amount: Column::resolve(amount, &index),
                direction: Column::resolve(direction, &index),
            },
        };

        RowReader {
            date: Column::resolve(schema.date_column, &index),
            description: Column::resolve(schema.description_column, &index),
            amounts,
        }
    }

    fn read(&self, row: &[String]) -> Result<TransactionCandidate, RowError> {
        let date = parse_date(self.date.read(row)?)?;
        let description = self.description.read(row)?;
        let raw = row.join(",");

        match &self.amounts {
            AmountColumns::Separate { debit, credit } => {
                // A malformed cell in one column must not hide a value in the other.
                let debit = parse_amount(debit.read(row)?).unwrap_or(0.0);
                let credit = parse_amount(credit.read(row)?).unwrap_or(0.0);

                if debit > 0.0 {
                    Ok(TransactionCandidate::debit(date, description, debit, raw))
                } else if credit > 0.0 {
                    Ok(TransactionCandidate::credit(date, description, credit, raw))
                } else {
                    Err(RowError::NoAmount)
                }
            }
            AmountColumns::Indicator { amount, direction } => {
                let value = parse_amount(amount.read(row)?)?;
                let indicator = direction.read(row)?;

                match indicator.trim().to_lowercase().as_str() {
                    "dr" => Ok(TransactionCandidate::debit(date, description, value, raw)),
                    "cr" => Ok(TransactionCandidate::credit(date, description, value, raw)),
                    _ => Err(RowError::InvalidDirection(indicator.to_string())),
                }
            }
        }
    }
}

fn is_empty_row(row: &[String]) -> bool {
    row.iter().all(|field| field.trim().is_empty())
}

fn is_summary_row(row: &[String]) -> bool {
    let Some(first) = row.first() else {
        return false;
    };
    let first = first.trim().to_lowercase();
    SUMMARY_KEYWORDS.iter().any(|k| first.contains(k))
}

/// Detects the bank from `headers` and parses every data row.
///
/// An unrecognised header is the only error; bad rows are dropped and
/// reported in [`ParseReport::skipped`].
pub fn parse_rows(headers: &[String], rows: &[Vec<String>]) -> Result<ParseReport, ImportError> {
    let bank = detect_bank(headers).ok_or(ImportError::UnrecognizedFormat)?;
    Ok(parse_with_schema(bank.schema(), headers, rows))
}

pub fn parse_with_schema(
    schema: &BankSchema,
    headers: &[String],
    rows: &[Vec<String>],
) -> ParseReport {
    let reader = RowReader::new(schema, headers);
    let mut transactions = Vec::with_capacity(rows.len());
    let mut skipped = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let row_number = idx + 2;

        if is_empty_row(row) {
            continue;
        }
        if is_summary_row(row) {
            debug!(row = row_number, "skipping summary row");
            continue;
        }

        match reader.read(row) {
            Ok(tx) => transactions.push(tx),
            Err(error) => {
                warn!(row = row_number, bank = %schema.bank, %error, "skipping row");
                skipped.push(RowWarning {
                    row: row_number,
                    error,
                });
            }
        }
    }

    ParseReport {
        bank: schema.bank,
        transactions,
        skipped,
    }
}
