//! Document endpoints: uploads, imports, transcription, and job control.

use std::collections::HashMap;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use super::{ApiError, AppState};
use crate::config::{MAX_BATCH_FILES, MAX_FILE_SIZE};
use crate::pipeline::batch::{unpack_zip, BatchFile, BatchOptions};
use crate::pipeline::ingest::FileKind;
use crate::pipeline::note;
use crate::pipeline::roster;

/// Everything a multipart upload carried: text fields plus file parts.
struct UploadForm {
    fields: HashMap<String, String>,
    files: Vec<BatchFile>,
}

impl UploadForm {
    fn flag(&self, name: &str) -> bool {
        matches!(
            self.fields.get(name).map(|v| v.as_str()),
            Some("true") | Some("1") | Some("on")
        )
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.fields.get(name).filter(|v| !v.is_empty()).cloned()
    }

    fn required(&self, name: &str) -> Result<String, ApiError> {
        self.optional(name)
            .ok_or_else(|| ApiError::bad_request(format!("missing required field \"{name}\"")))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut form = UploadForm {
        fields: HashMap::new(),
        files: Vec::new(),
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(|f| f.to_string()) {
            Some(file_name) => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed reading upload: {e}")))?;
                form.files.push(BatchFile {
                    name: file_name,
                    bytes: bytes.to_vec(),
                });
            }
            None => {
                let value = field.text().await.unwrap_or_default();
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

fn batch_options(form: &UploadForm) -> Result<BatchOptions, ApiError> {
    Ok(BatchOptions {
        therapist_id: form.required("therapistId")?,
        client_id: form.optional("clientId"),
        compress: form.flag("compress"),
        deduplicate: form.flag("deduplicate"),
        session_id: form.optional("sessionId"),
    })
}

fn check_file_budget(files: &[BatchFile]) -> Result<(), ApiError> {
    if files.is_empty() {
        return Err(ApiError::bad_request("no files in upload"));
    }
    if files.len() > MAX_BATCH_FILES {
        return Err(ApiError::bad_request(format!(
            "too many files: {} (limit {MAX_BATCH_FILES})",
            files.len()
        )));
    }
    if let Some(oversize) = files.iter().find(|f| f.bytes.len() as u64 > MAX_FILE_SIZE) {
        return Err(ApiError::bad_request(format!(
            "file \"{}\" exceeds the {}MB limit",
            oversize.name,
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }
    Ok(())
}

/// `POST /api/documents/batch-upload`
pub async fn batch_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(multipart).await?;
    let opts = batch_options(&form)?;
    check_file_budget(&form.files)?;

    info!(files = form.files.len(), "batch upload accepted");
    let outcome = state.batch.process_batch(form.files, opts).await;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

/// `POST /api/documents/import-zip`: one archive, fanned out through the
/// batch pipeline.
pub async fn import_zip(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(multipart).await?;
    let opts = batch_options(&form)?;
    let [archive] = form.files.as_slice() else {
        return Err(ApiError::bad_request("expected exactly one zip file"));
    };
    if !archive.name.to_lowercase().ends_with(".zip") {
        return Err(ApiError::bad_request("expected a .zip upload"));
    }

    let files = unpack_zip(&archive.bytes)?;
    check_file_budget(&files)?;
    let outcome = state.batch.process_batch(files, opts).await;
    Ok(Json(serde_json::to_value(outcome).unwrap_or_default()))
}

/// `POST /api/documents/import-clients`: CSV/XLSX roster with per-row
/// validation; partial success is a 200 with itemized errors.
pub async fn import_clients(multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let form = read_form(multipart).await?;
    let [file] = form.files.as_slice() else {
        return Err(ApiError::bad_request("expected exactly one roster file"));
    };
    let import = roster::parse_roster(&file.name, &file.bytes)?;
    Ok(Json(serde_json::to_value(import).unwrap_or_default()))
}

/// `POST /api/documents/transcribe-audio`: single audio file, optionally
/// generating a session note from the transcript.
pub async fn transcribe_audio(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = read_form(multipart).await?;
    let [file] = form.files.as_slice() else {
        return Err(ApiError::bad_request("expected exactly one audio file"));
    };
    if FileKind::from_name(&file.name) != Some(FileKind::Audio) {
        return Err(ApiError::bad_request(format!(
            "\"{}\" is not an audio file (.mp3, .wav, .m4a)",
            file.name
        )));
    }

    let doc = state
        .batch
        .ingestor()
        .process_document(&file.name, &file.bytes)
        .await?;

    let session_note = if form.flag("createNote") {
        let note = note::generate_progress_note(
            state.batch.ingestor().router(),
            &doc.extracted_text,
            doc.detected_client_name.as_deref(),
            form.optional("clientId"),
            doc.detected_session_date.clone(),
        )
        .await?;
        Some(serde_json::to_value(note).unwrap_or_default())
    } else {
        None
    };

    Ok(Json(json!({
        "transcript": doc.extracted_text,
        "detectedClientName": doc.detected_client_name,
        "detectedSessionDate": doc.detected_session_date,
        "note": session_note,
    })))
}

/// `GET /api/documents/processing-status/:job_id`
pub async fn processing_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.batch.jobs().get(&job_id) {
        Some(job) => Ok(Json(serde_json::to_value(job).unwrap_or_default())),
        None => Err(crate::pipeline::batch::JobError::NotFound(job_id).into()),
    }
}

/// `GET /api/documents/active-jobs`
pub async fn active_jobs(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::to_value(state.batch.jobs().active_jobs()).unwrap_or_default())
}

/// `POST /api/documents/cancel/:job_id`
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.batch.jobs().cancel(&job_id)?;
    Ok(Json(json!({ "cancelled": true, "job": job })))
}
