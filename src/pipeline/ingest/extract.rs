//! Per-format text extraction. Every extractor works on in-memory bytes; the
//! upload never touches the filesystem.

use std::io::{Cursor, Read};

use calamine::{open_workbook_auto_from_rs, Reader as SheetReader};
use quick_xml::events::Event;
use tracing::debug;

use super::IngestError;

/// PDF text extraction, page by page. Pages that fail to decode are skipped;
/// a document where no page yields text is reported with remediation guidance.
pub fn pdf_text(bytes: &[u8]) -> Result<String, IngestError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let mut out = String::new();
    for (page_num, _) in doc.get_pages() {
        match doc.extract_text(&[page_num]) {
            Ok(text) => {
                out.push_str(&text);
                out.push('\n');
            }
            Err(err) => debug!(page = page_num, error = %err, "skipping undecodable pdf page"),
        }
    }
    if out.trim().is_empty() {
        return Err(IngestError::Empty {
            kind: "pdf",
            hint: "no extractable text; try converting the PDF to text or an image scan",
        });
    }
    Ok(out)
}

/// Word (.docx) extraction: the document is a zip container whose
/// `word/document.xml` carries the text runs.
pub fn word_text(bytes: &[u8]) -> Result<String, IngestError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| IngestError::Empty {
            kind: "word",
            hint: "not a .docx container (legacy .doc is not readable; re-save as .docx)",
        })?
        .read_to_string(&mut xml)?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut out = String::new();
    loop {
        match reader.read_event() {
            Ok(Event::Text(t)) => {
                out.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"w:p" => out.push('\n'),
            Ok(Event::Empty(e)) if e.name().as_ref() == b"w:tab" => out.push('\t'),
            Ok(Event::Eof) => break,
            Err(err) => return Err(IngestError::Xml(err)),
            _ => {}
        }
    }

    if out.trim().is_empty() {
        return Err(IngestError::Empty {
            kind: "word",
            hint: "document contains no text runs",
        });
    }
    Ok(out)
}

/// Spreadsheet extraction: every sheet serialized as tab-delimited rows under
/// a `Sheet: <name>` header.
pub fn spreadsheet_text(bytes: &[u8]) -> Result<String, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let mut out = String::new();
    for name in workbook.sheet_names().to_vec() {
        let Ok(range) = workbook.worksheet_range(&name) else {
            continue;
        };
        if range.is_empty() {
            continue;
        }
        out.push_str(&format!("Sheet: {name}\n"));
        for row in range.rows() {
            let line = row
                .iter()
                .map(|cell| cell.to_string())
                .collect::<Vec<_>>()
                .join("\t");
            out.push_str(&line);
            out.push('\n');
        }
        out.push('\n');
    }
    if out.trim().is_empty() {
        return Err(IngestError::Empty {
            kind: "spreadsheet",
            hint: "workbook has no populated cells",
        });
    }
    Ok(out)
}

/// CSV extraction: header row then tab-joined records.
pub fn csv_text(bytes: &[u8]) -> Result<String, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let mut out = String::new();

    if let Ok(headers) = reader.headers() {
        out.push_str(&headers.iter().collect::<Vec<_>>().join("\t"));
        out.push('\n');
    }
    for record in reader.records() {
        let record = record?;
        out.push_str(&record.iter().collect::<Vec<_>>().join("\t"));
        out.push('\n');
    }

    if out.trim().is_empty() {
        return Err(IngestError::Empty {
            kind: "csv",
            hint: "file has no rows",
        });
    }
    Ok(out)
}

/// Plain text / markdown: lossy UTF-8 read.
pub fn plain_text(bytes: &[u8]) -> Result<String, IngestError> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    if text.trim().is_empty() {
        return Err(IngestError::Empty {
            kind: "text",
            hint: "file is empty",
        });
    }
    Ok(text)
}

/// Prepare an image for OCR: decode, downsize anything over 2000px on its
/// longest edge, and re-encode as PNG for the vision request.
pub fn image_for_ocr(bytes: &[u8]) -> Result<Vec<u8>, IngestError> {
    const MAX_EDGE: u32 = 2000;
    let img = image::load_from_memory(bytes)?;
    let img = if img.width() > MAX_EDGE || img.height() > MAX_EDGE {
        img.thumbnail(MAX_EDGE, MAX_EDGE)
    } else {
        img
    };
    let mut encoded = Vec::new();
    img.write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)?;
    Ok(encoded)
}
