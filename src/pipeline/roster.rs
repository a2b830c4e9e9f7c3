//! Client roster import from CSV or spreadsheet uploads, validated row by row.
//! A bad row is reported with its row number and skipped; the rest import.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader as SheetReader};
use serde::Serialize;
use tracing::info;

use crate::pipeline::ingest::{FileKind, IngestError};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRowError {
    /// 1-based row number in the source file, header included.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterImport {
    pub imported: usize,
    pub failed: usize,
    pub clients: Vec<NewClient>,
    pub errors: Vec<RosterRowError>,
}

/// Parse a roster upload. Returns an error only when the file itself is
/// unreadable; row-level problems land in `errors[]`.
pub fn parse_roster(file_name: &str, bytes: &[u8]) -> Result<RosterImport, IngestError> {
    let rows = match FileKind::from_name(file_name) {
        Some(FileKind::Csv) => csv_rows(bytes)?,
        Some(FileKind::Spreadsheet) => sheet_rows(bytes)?,
        _ => {
            let extension = std::path::Path::new(file_name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            return Err(IngestError::Unsupported {
                file_name: file_name.to_string(),
                extension,
            });
        }
    };
    let import = validate(rows);
    info!(
        file = %file_name,
        imported = import.imported,
        failed = import.failed,
        "roster parsed"
    );
    Ok(import)
}

fn csv_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(bytes);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }
    Ok(rows)
}

fn sheet_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let Some(name) = workbook.sheet_names().first().cloned() else {
        return Ok(Vec::new());
    };
    let range = workbook.worksheet_range(&name)?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(|c| c.to_string().trim().to_string()).collect())
        .collect())
}

/// First row is the header. `firstName`/`lastName` (in any common casing or
/// separator style) are required per row; other columns are optional.
fn validate(rows: Vec<Vec<String>>) -> RosterImport {
    let mut import = RosterImport {
        imported: 0,
        failed: 0,
        clients: Vec::new(),
        errors: Vec::new(),
    };

    let Some(header) = rows.first() else {
        import.errors.push(RosterRowError {
            row: 1,
            message: "file has no header row".to_string(),
        });
        import.failed = 1;
        return import;
    };
    let columns: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
    let col = |name: &str| columns.iter().position(|c| c == name);
    let (first_idx, last_idx) = (col("firstname"), col("lastname"));
    let email_idx = col("email");
    let phone_idx = col("phone");
    let dob_idx = col("dateofbirth").or_else(|| col("dob"));

    if first_idx.is_none() || last_idx.is_none() {
        import.errors.push(RosterRowError {
            row: 1,
            message: "header must include firstName and lastName columns".to_string(),
        });
        import.failed = 1;
        return import;
    }

    for (offset, row) in rows.iter().enumerate().skip(1) {
        let row_number = offset + 1;
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        let cell = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| row.get(i))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let first_name = cell(first_idx);
        let last_name = cell(last_idx);
        match (first_name, last_name) {
            (Some(first_name), Some(last_name)) => {
                import.clients.push(NewClient {
                    first_name,
                    last_name,
                    email: cell(email_idx),
                    phone: cell(phone_idx),
                    date_of_birth: cell(dob_idx),
                });
                import.imported += 1;
            }
            (first, last) => {
                let missing = match (first.is_none(), last.is_none()) {
                    (true, true) => "firstName and lastName",
                    (true, false) => "firstName",
                    _ => "lastName",
                };
                import.failed += 1;
                import.errors.push(RosterRowError {
                    row: row_number,
                    message: format!("missing required field(s): {missing}"),
                });
            }
        }
    }
    import
}

fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
