pub mod csv;
pub mod detect;
pub mod normalize;
pub mod pdf;
pub mod rows;
pub mod validate;
pub mod xlsx;

use cashlens_core::{PdfSettings, TransactionCandidate};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub use detect::detect_bank;
pub use normalize::{parse_amount, parse_date, NormalizeError};
pub use pdf::{ExtractionResponse, PdfError, PdfExtractor};
pub use rows::{parse_rows, parse_with_schema, ParseReport, RowError, RowWarning};
pub use validate::{ContentKind, FileValidator, ValidationError, ValidationReport};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("unrecognized statement format (unknown bank format)")]
    UnrecognizedFormat,
    #[error("empty file")]
    EmptyFile,
    #[error("no sheets found in spreadsheet")]
    NoSheets,
    #[error("failed to open spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("failed to read CSV: {0}")]
    Csv(#[from] ::csv::Error),
    #[error(transparent)]
    Pdf(#[from] PdfError),
}

/// Header row plus data rows, as read from any supported container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowGrid {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Container formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Spreadsheet,
    Pdf,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Result<Self, ImportError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "xls" => Ok(Self::Spreadsheet),
            "pdf" => Ok(Self::Pdf),
            "" => Err(ImportError::UnsupportedFileType(String::new())),
            other => Err(ImportError::UnsupportedFileType(format!(".{other}"))),
        }
    }
}

/// Turns an uploaded statement file into transaction candidates.
#[derive(Debug, Clone)]
pub struct StatementParser {
    pdf: PdfExtractor,
}

impl StatementParser {
    pub fn new(settings: &PdfSettings) -> Result<Self, ImportError> {
        Ok(Self {
            pdf: PdfExtractor::from_settings(settings)?,
        })
    }

    pub fn with_extractor(pdf: PdfExtractor) -> Self {
        Self { pdf }
    }

    pub async fn read_grid(&self, data: &[u8], filename: &str) -> Result<RowGrid, ImportError> {
        match FileKind::from_filename(filename)? {
            FileKind::Csv => csv::read_grid(data),
            FileKind::Spreadsheet => xlsx::read_grid(data),
            FileKind::Pdf => Ok(self.pdf.read_grid(data).await?),
        }
    }

    pub async fn parse_file(
        &self,
        data: &[u8],
        filename: &str,
    ) -> Result<Vec<TransactionCandidate>, ImportError> {
        Ok(self.parse_file_with_report(data, filename).await?.transactions)
    }

    /// Like [`parse_file`](Self::parse_file) but keeps the detected bank
    /// and the rows that were dropped.
    pub async fn parse_file_with_report(
        &self,
        data: &[u8],
        filename: &str,
    ) -> Result<ParseReport, ImportError> {
        let grid = self.read_grid(data, filename).await?;
        let report = parse_rows(&grid.headers, &grid.rows)?;
        info!(
            file = filename,
            bank = %report.bank,
            transactions = report.transactions.len(),
            skipped = report.skipped.len(),
            "parsed statement"
        );
        Ok(report)
    }
}
