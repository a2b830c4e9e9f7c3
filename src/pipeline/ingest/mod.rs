//! Document ingestion: format dispatch, text extraction, and best-effort
//! metadata, producing one `ProcessedDocument` per upload.

pub mod extract;
pub mod format;
pub mod metadata;
pub mod sanitize;

use std::sync::Arc;

use base64::Engine;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::MAX_FILE_SIZE;
use crate::pipeline::dates;
use crate::providers::{ProviderError, SpeechToText, VisionRequest};
use crate::router::{ModelRouter, RouterError};

pub use format::FileKind;
pub use metadata::DocumentMetadata;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("unsupported file type \"{extension}\" ({file_name})")]
    Unsupported {
        file_name: String,
        extension: String,
    },

    #[error("{kind} file yielded no content: {hint}")]
    Empty {
        kind: &'static str,
        hint: &'static str,
    },

    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("pdf parse failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("archive read failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("spreadsheet parse failed: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("csv parse failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("document xml parse failed: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl IngestError {
    fn unsupported(file_name: &str) -> Self {
        let extension = std::path::Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self::Unsupported {
            file_name: file_name.to_string(),
            extension,
        }
    }
}

/// One upload, extracted and annotated. Immutable once built.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedDocument {
    pub extracted_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_session_date: Option<String>,
    pub file_type: String,
    pub metadata: serde_json::Value,
}

const OCR_PROMPT: &str = "Transcribe all text visible in this document image. \
Preserve the reading order and line structure. Output only the transcription.";

/// Nested zips are dispatched like any other entry, but only this deep.
const MAX_ZIP_DEPTH: u8 = 2;

pub struct DocumentIngestor {
    router: Arc<ModelRouter>,
    stt: Arc<dyn SpeechToText>,
}

impl DocumentIngestor {
    pub fn new(router: Arc<ModelRouter>, stt: Arc<dyn SpeechToText>) -> Self {
        Self { router, stt }
    }

    pub fn router(&self) -> &ModelRouter {
        &self.router
    }

    /// Full pipeline: dispatch, extract, sanitize, annotate with metadata.
    /// Metadata failures never fail the document; extraction failures always do.
    pub async fn process_document(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<ProcessedDocument, IngestError> {
        if bytes.len() as u64 > MAX_FILE_SIZE {
            return Err(IngestError::TooLarge {
                size: bytes.len() as u64,
                limit: MAX_FILE_SIZE,
            });
        }
        let kind = FileKind::from_name(file_name)
            .ok_or_else(|| IngestError::unsupported(file_name))?;

        let raw = self.extract_text(file_name, kind, bytes, 0).await?;
        let text = sanitize::clean_text(&raw);
        if text.is_empty() {
            return Err(IngestError::Empty {
                kind: kind.as_str(),
                hint: "extraction produced only whitespace; try converting to text or image",
            });
        }

        let meta = metadata::extract_metadata(&self.router, &text).await;
        let date_scan = dates::extract_date(&text);
        let mut detected_session_date = meta.session_date.or(date_scan.extracted_date.clone());
        // Dates outside the plausible session window are extraction noise
        // (old letterheads, future appointment reminders); drop them.
        if let Some(date) = detected_session_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        {
            if !dates::within_review_window(date, Utc::now().date_naive()) {
                warn!(file = %file_name, %date, "detected session date outside plausible window, discarding");
                detected_session_date = None;
            }
        }

        info!(
            file = %file_name,
            kind = kind.as_str(),
            chars = text.chars().count(),
            "document processed"
        );

        Ok(ProcessedDocument {
            metadata: json!({
                "fileName": file_name,
                "byteSize": bytes.len(),
                "charCount": text.chars().count(),
                "dateConfidence": date_scan.confidence,
                "sniffedFormat": format::sniff(bytes),
            }),
            extracted_text: text,
            detected_client_name: meta.client_name,
            detected_session_date,
            file_type: kind.as_str().to_string(),
        })
    }

    /// Dispatch table. Zip entries re-enter here with an incremented depth.
    async fn extract_text(
        &self,
        file_name: &str,
        kind: FileKind,
        bytes: &[u8],
        depth: u8,
    ) -> Result<String, IngestError> {
        match kind {
            FileKind::Pdf => extract::pdf_text(bytes),
            FileKind::Word => extract::word_text(bytes),
            FileKind::PlainText => extract::plain_text(bytes),
            FileKind::Spreadsheet => extract::spreadsheet_text(bytes),
            FileKind::Csv => extract::csv_text(bytes),
            FileKind::Image => self.ocr_image(file_name, bytes).await,
            FileKind::Audio => Ok(self.stt.transcribe(file_name, bytes.to_vec()).await?),
            FileKind::Zip => self.zip_text(bytes, depth).await,
        }
    }

    async fn ocr_image(&self, file_name: &str, bytes: &[u8]) -> Result<String, IngestError> {
        let prepared = extract::image_for_ocr(bytes)?;
        let req = VisionRequest {
            prompt: OCR_PROMPT.to_string(),
            image_base64: base64::engine::general_purpose::STANDARD.encode(&prepared),
            media_type: "image/png".to_string(),
            max_tokens: 4096,
        };
        let response = self.router.multimodal_ocr(&req).await?;
        if response.confidence == Some(0.0) {
            return Err(IngestError::Empty {
                kind: "image",
                hint: "no vision provider is configured for OCR",
            });
        }
        info!(file = %file_name, model = %response.model, "image transcribed via OCR");
        Ok(response.content)
    }

    /// Extract every entry, re-dispatching through the table. A failing entry
    /// is logged and skipped; an archive where nothing extracts is an error.
    async fn zip_text(&self, bytes: &[u8], depth: u8) -> Result<String, IngestError> {
        if depth >= MAX_ZIP_DEPTH {
            return Err(IngestError::Empty {
                kind: "zip",
                hint: "archive nesting too deep",
            });
        }

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
        let mut out = String::new();

        for index in 0..archive.len() {
            let (entry_name, entry_bytes) = {
                let mut entry = archive.by_index(index)?;
                if entry.is_dir() {
                    continue;
                }
                let name = entry.name().to_string();
                let mut buf = Vec::with_capacity(entry.size() as usize);
                std::io::Read::read_to_end(&mut entry, &mut buf)?;
                (name, buf)
            };

            let Some(kind) = FileKind::from_name(&entry_name) else {
                warn!(entry = %entry_name, "skipping unsupported zip entry");
                continue;
            };
            match Box::pin(self.extract_text(&entry_name, kind, &entry_bytes, depth + 1)).await
            {
                Ok(text) => {
                    out.push_str(&format!("=== {entry_name} ===\n{text}\n\n"));
                }
                Err(err) => {
                    warn!(entry = %entry_name, error = %err, "zip entry failed, skipping");
                }
            }
        }

        if out.trim().is_empty() {
            return Err(IngestError::Empty {
                kind: "zip",
                hint: "no archive entry produced text",
            });
        }
        Ok(out)
    }
}
