use chrono::{Datelike, NaiveDate};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("unable to parse date: {0}")]
    InvalidDate(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

/// Day-first layouts in priority order. `%B` accepts abbreviated and full
/// month names alike.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y",   // 15/01/2024 (HDFC, ICICI, Kotak)
    "%Y-%m-%d",   // 2024-01-15
    "%d-%B-%Y",   // 15-Jan-2024 (SBI)
    "%d-%m-%Y",   // 15-01-2024
    "%d/%m/%y",   // 15/01/24
    "%d-%B-%y",   // 15-Jan-24
    "%d-%m-%y",   // 15-01-24
    "%B %d, %Y",  // Jan 15, 2024
    "%d %B %Y",   // 15 January 2024
];

const CURRENCY_MARKERS: &[&str] = &["₹", "Rs.", "Rs", "INR"];

pub fn parse_date(s: &str) -> Result<NaiveDate, NormalizeError> {
    let s = s.trim();

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            // `%Y` happily reads "24" as year 24; leave short years to `%y`.
            if fmt.contains("%Y") && date.year() < 100 {
                continue;
            }
            return Ok(date);
        }
    }

    Err(NormalizeError::InvalidDate(s.to_string()))
}

/// Parses a statement amount. Blank cells and a lone dash mean zero.
pub fn parse_amount(s: &str) -> Result<f64, NormalizeError> {
    let mut cleaned = s.to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.replace(',', "");
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "-" {
        return Ok(0.0);
    }

    match cleaned.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(NormalizeError::InvalidAmount(s.to_string())),
    }
}
