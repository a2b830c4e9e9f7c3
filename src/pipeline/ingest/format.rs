//! File-kind detection: extension dispatch with a magic-byte cross-check.

use serde::Serialize;

/// Supported upload kinds, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Word,
    PlainText,
    Image,
    Spreadsheet,
    Csv,
    Audio,
    Zip,
}

impl FileKind {
    /// Dispatch on the file name's extension. `None` means unsupported.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = extension(name)?;
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Word),
            "txt" | "md" => Some(Self::PlainText),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" => Some(Self::Image),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            "csv" => Some(Self::Csv),
            "mp3" | "wav" | "m4a" => Some(Self::Audio),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::PlainText => "text",
            Self::Image => "image",
            Self::Spreadsheet => "spreadsheet",
            Self::Csv => "csv",
            Self::Audio => "audio",
            Self::Zip => "zip",
        }
    }
}

/// MIME type for an image upload, derived from its extension. OCR providers
/// require an exact media type alongside the base64 payload.
pub fn image_media_type(name: &str) -> &'static str {
    match extension(name).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

/// Magic-byte sniff used to catch renamed files before handing bytes to a
/// parser. Returns `None` when the signature is unrecognized or ambiguous
/// (zip containers cover .zip, .docx and .xlsx alike).
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        Some("pdf")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpeg")
    } else if bytes.starts_with(b"GIF8") {
        Some("gif")
    } else if bytes.starts_with(b"PK\x03\x04") {
        Some("zip-container")
    } else {
        None
    }
}

fn extension(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}
