//! Content extraction
//!
//! Turns an uploaded document into text for the parser. Text-like formats are
//! decoded directly and gzipped exports are inflated first. Anything else
//! (PDF, images) is reported as unsupported; the orchestrator then falls back
//! to [`read_as_plain_text`].

use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::io::Read;
use thiserror::Error;

use crate::models::SourceDocument;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Document is not valid UTF-8 text: {0}")]
    NotText(#[from] std::string::FromUtf8Error),

    #[error("Failed to decompress document: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("Document is empty")]
    Empty,
}

/// Extraction capability: document in, text out
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, document: &SourceDocument) -> Result<String, ExtractError>;
}

const TEXT_EXTENSIONS: &[&str] = &["txt", "csv", "tsv", "json", "md", "text"];

/// Picks a decoder from the file extension, then the content type
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    fn is_text(document: &SourceDocument, extension: Option<&str>) -> bool {
        if let Some(ext) = extension {
            return TEXT_EXTENSIONS.contains(&ext);
        }
        document
            .content_type
            .as_deref()
            .map(|ct| ct.starts_with("text/") || ct == "application/json")
            .unwrap_or(false)
    }
}

#[async_trait]
impl ContentExtractor for DocumentExtractor {
    async fn extract(&self, document: &SourceDocument) -> Result<String, ExtractError> {
        if document.is_empty() {
            return Err(ExtractError::Empty);
        }

        let extension = document.extension();
        match extension.as_deref() {
            Some("gz") => {
                let mut decoder = GzDecoder::new(document.bytes.as_slice());
                let mut inflated = Vec::new();
                decoder.read_to_end(&mut inflated)?;
                Ok(String::from_utf8(inflated)?)
            },
            ext if Self::is_text(document, ext) => Ok(String::from_utf8(document.bytes.clone())?),
            ext => Err(ExtractError::UnsupportedFormat(
                ext.map(str::to_string)
                    .or_else(|| document.content_type.clone())
                    .unwrap_or_else(|| "unknown".to_string()),
            )),
        }
    }
}

/// Reinterpret the raw bytes as UTF-8 text, ignoring the declared format.
/// A leading byte-order mark is dropped.
pub fn read_as_plain_text(document: &SourceDocument) -> Result<String, ExtractError> {
    let bytes = document
        .bytes
        .strip_prefix(b"\xEF\xBB\xBF")
        .unwrap_or(&document.bytes);
    Ok(String::from_utf8(bytes.to_vec())?)
}
