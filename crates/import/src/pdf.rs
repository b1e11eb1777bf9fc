use cashlens_core::PdfSettings;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::RowGrid;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("failed to call PDF parser service: {0}")]
    Request(reqwest::Error),
    #[error("PDF parser service returned error (status {status}): {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no rows returned from PDF parser")]
    NoRows,
}

/// Body returned by the table-extraction service's `/parse` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResponse {
    /// Extracted table cells; the service emits `null` for empty cells.
    pub rows: Vec<Vec<Option<String>>>,
    #[serde(default)]
    pub pages_processed: u32,
}

/// Client for the external PDF table-extraction service. No retries.
#[derive(Debug, Clone)]
pub struct PdfExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl PdfExtractor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PdfError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PdfError::Client)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_settings(settings: &PdfSettings) -> Result<Self, PdfError> {
        Self::new(settings.endpoint.clone(), settings.timeout())
    }

    fn parse_url(&self) -> String {
        format!("{}/parse", self.endpoint.trim_end_matches('/'))
    }

    pub async fn extract(&self, data: &[u8]) -> Result<ExtractionResponse, PdfError> {
        let part = Part::bytes(data.to_vec())
            .file_name("statement.pdf")
            .mime_str("application/pdf")
            .map_err(PdfError::Client)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.parse_url())
            .multipart(form)
            .send()
            .await
            .map_err(PdfError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PdfError::Status { status, body });
        }

        let body = response.bytes().await.map_err(PdfError::Request)?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Extracts the statement table; the first row is the header.
    pub async fn read_grid(&self, data: &[u8]) -> Result<RowGrid, PdfError> {
        let extracted = self.extract(data).await?;
        tracing::debug!(
            rows = extracted.rows.len(),
            pages = extracted.pages_processed,
            "PDF extraction complete"
        );

        let mut rows = extracted
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(Option::unwrap_or_default).collect::<Vec<String>>());

        let headers = rows.next().ok_or(PdfError::NoRows)?;
        Ok(RowGrid {
            headers,
            rows: rows.collect(),
        })
    }
}
