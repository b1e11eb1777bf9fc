//! Upload checks run before a statement reaches the parser.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;

const ALLOWED_EXTENSIONS: [&str; 4] = ["csv", "xlsx", "xls", "pdf"];

const MIME_CSV: &str = "text/csv";
const MIME_XLS: &str = "application/vnd.ms-excel";
const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MIME_PDF: &str = "application/pdf";

const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

/// Bytes inspected when deciding whether a payload is text.
const TEXT_SAMPLE_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("filename cannot be empty")]
    EmptyFilename,
    #[error("filename contains path traversal")]
    PathTraversal,
    #[error("filename contains null bytes")]
    NullByte,
    #[error("filename cannot be absolute path")]
    AbsolutePath,
    #[error("filename must have an extension")]
    MissingExtension,
    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),
    #[error("MIME type cannot be empty")]
    EmptyContentType,
    #[error("unsupported MIME type: {0}")]
    UnsupportedContentType(String),
    #[error("empty file")]
    EmptyFile,
    #[error("file size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported file type based on content")]
    UnknownContent,
    #[error("MIME type does not match file content")]
    ContentTypeMismatch,
}

/// What the leading bytes of an upload look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Csv,
    Spreadsheet,
    Pdf,
}

impl ContentKind {
    fn accepts(self, content_type: &str) -> bool {
        match self {
            Self::Csv => content_type == MIME_CSV,
            Self::Spreadsheet => content_type == MIME_XLSX || content_type == MIME_XLS,
            Self::Pdf => content_type == MIME_PDF,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub detected: Option<ContentKind>,
    pub size: usize,
    #[serde(serialize_with = "serialize_errors")]
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[ValidationError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

#[derive(Debug, Clone)]
pub struct FileValidator {
    max_size_bytes: usize,
}

impl FileValidator {
    pub fn new(max_size_bytes: usize) -> Self {
        Self { max_size_bytes }
    }

    /// Runs every check and collects all failures rather than stopping at the first.
    pub fn validate(&self, data: &[u8], filename: &str, content_type: &str) -> ValidationReport {
        let mut errors = Vec::new();

        if let Err(e) = self.check_filename(filename) {
            errors.push(e);
        }
        if let Err(e) = self.check_content_type(content_type) {
            errors.push(e);
        }
        if let Err(e) = self.check_size(data.len()) {
            errors.push(e);
        }

        let detected = match self.detect_kind(data) {
            Ok(kind) => {
                if !kind.accepts(content_type) {
                    errors.push(ValidationError::ContentTypeMismatch);
                }
                Some(kind)
            }
            // An empty payload was already reported by the size check.
            Err(e) => {
                if !data.is_empty() {
                    errors.push(e);
                }
                None
            }
        };

        ValidationReport {
            detected,
            size: data.len(),
            errors,
        }
    }

    pub fn check_filename(&self, filename: &str) -> Result<(), ValidationError> {
        if filename.is_empty() {
            return Err(ValidationError::EmptyFilename);
        }
        if filename.contains("..") {
            return Err(ValidationError::PathTraversal);
        }
        if filename.contains('\0') {
            return Err(ValidationError::NullByte);
        }
        if filename.starts_with('/') || filename.starts_with('\\') {
            return Err(ValidationError::AbsolutePath);
        }

        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or(ValidationError::MissingExtension)?;

        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(ValidationError::UnsupportedExtension(ext));
        }
        Ok(())
    }

    pub fn check_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        match content_type {
            "" => Err(ValidationError::EmptyContentType),
            MIME_CSV | MIME_XLS | MIME_XLSX | MIME_PDF => Ok(()),
            other => Err(ValidationError::UnsupportedContentType(other.to_string())),
        }
    }

    pub fn check_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }
        if size > self.max_size_bytes {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_size_bytes,
            });
        }
        Ok(())
    }

    pub fn detect_kind(&self, data: &[u8]) -> Result<ContentKind, ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        if data.starts_with(PDF_MAGIC) {
            return Ok(ContentKind::Pdf);
        }
        if data.starts_with(ZIP_MAGIC) {
            return Ok(ContentKind::Spreadsheet);
        }
        if looks_like_text(data) {
            return Ok(ContentKind::Csv);
        }
        Err(ValidationError::UnknownContent)
    }
}

/// No NUL and more than 95% printable ASCII or common whitespace in the sample.
fn looks_like_text(data: &[u8]) -> bool {
    let sample = &data[..data.len().min(TEXT_SAMPLE_LEN)];
    if sample.is_empty() || sample.contains(&0) {
        return false;
    }
    let printable = sample
        .iter()
        .filter(|&&b| (0x20..=0x7E).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    printable as f64 / sample.len() as f64 > 0.95
}
