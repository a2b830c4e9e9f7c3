//! Batch processing: a bounded worker pool over uploaded files with per-file
//! retry, dedup short-circuit, and isolated failures.

use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::compress::{compress_if_large, StoredBody};
use super::dedup::{content_hash, DedupCache};
use super::progress::JobTracker;
use crate::pipeline::ingest::{DocumentIngestor, IngestError};
use crate::pipeline::note;
use crate::pipeline::tags;
use crate::store::{DocumentStore, NewDocument};

#[derive(Debug, Clone)]
pub struct BatchFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub therapist_id: String,
    pub client_id: Option<String>,
    pub compress: bool,
    pub deduplicate: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub success: bool,
    pub processed: usize,
    pub failed: usize,
    pub results: Vec<serde_json::Value>,
    pub errors: Vec<BatchItemError>,
}

pub struct BatchProcessor {
    ingestor: Arc<DocumentIngestor>,
    store: Arc<dyn DocumentStore>,
    jobs: Arc<JobTracker>,
    dedup: Arc<DedupCache>,
    concurrency: usize,
    max_retries: u32,
}

impl BatchProcessor {
    pub fn new(
        ingestor: Arc<DocumentIngestor>,
        store: Arc<dyn DocumentStore>,
        jobs: Arc<JobTracker>,
        dedup: Arc<DedupCache>,
        concurrency: usize,
        max_retries: u32,
    ) -> Self {
        Self {
            ingestor,
            store,
            jobs,
            dedup,
            concurrency: concurrency.max(1),
            max_retries,
        }
    }

    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn ingestor(&self) -> &Arc<DocumentIngestor> {
        &self.ingestor
    }

    /// Process files through the worker pool. One bad file never aborts the
    /// batch; its error lands in `errors[]` while the rest proceed.
    pub async fn process_batch(&self, files: Vec<BatchFile>, opts: BatchOptions) -> BatchOutcome {
        let total = files.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let finished = Arc::new(AtomicUsize::new(0));
        let opts = Arc::new(opts);

        let mut handles = Vec::with_capacity(total);
        for file in files {
            let permit_source = Arc::clone(&semaphore);
            let ingestor = Arc::clone(&self.ingestor);
            let store = Arc::clone(&self.store);
            let jobs = Arc::clone(&self.jobs);
            let dedup = Arc::clone(&self.dedup);
            let opts = Arc::clone(&opts);
            let finished = Arc::clone(&finished);
            let max_retries = self.max_retries;

            handles.push(tokio::spawn(async move {
                let _permit = permit_source.acquire_owned().await;
                let outcome =
                    process_one(&ingestor, &store, &jobs, &dedup, &opts, &file, max_retries)
                        .await;
                let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                jobs.broadcast_batch(
                    opts.session_id.clone(),
                    json!({ "completed": done, "total": total }),
                );
                (file.name, outcome)
            }));
        }

        let mut outcome = BatchOutcome {
            success: true,
            processed: 0,
            failed: 0,
            results: Vec::new(),
            errors: Vec::new(),
        };
        for handle in join_all(handles).await {
            match handle {
                Ok((_, Ok(result))) => {
                    outcome.processed += 1;
                    outcome.results.push(result);
                }
                Ok((file_name, Err(message))) => {
                    outcome.failed += 1;
                    outcome.errors.push(BatchItemError { file_name, message });
                }
                Err(join_err) => {
                    outcome.failed += 1;
                    outcome.errors.push(BatchItemError {
                        file_name: "<worker>".to_string(),
                        message: join_err.to_string(),
                    });
                }
            }
        }
        outcome.success = outcome.failed == 0;
        info!(
            processed = outcome.processed,
            failed = outcome.failed,
            "batch finished"
        );
        outcome
    }
}

/// One file: dedup short-circuit, then extract-and-store with linear retry
/// backoff (`attempt * 1000ms`). Cancellation is observed between attempts.
async fn process_one(
    ingestor: &DocumentIngestor,
    store: &Arc<dyn DocumentStore>,
    jobs: &JobTracker,
    dedup: &DedupCache,
    opts: &BatchOptions,
    file: &BatchFile,
    max_retries: u32,
) -> Result<serde_json::Value, String> {
    let job = jobs.create(&file.name, file.bytes.len() as u64, opts.session_id.clone());
    let hash = content_hash(&file.bytes);

    if opts.deduplicate {
        // The cache is a bounded FIFO; evicted or pre-restart uploads are
        // still caught by the store's hash index.
        let existing = dedup
            .lookup(&hash)
            .or_else(|| store.find_by_hash(&hash).map(|record| record.id));
        if let Some(document_id) = existing {
            info!(file = %file.name, %document_id, "duplicate upload, skipping reprocess");
            dedup.record(hash, document_id.clone());
            let result = json!({
                "documentId": document_id,
                "fileName": file.name,
                "deduplicated": true,
            });
            let _ = jobs.complete(&job.id, result.clone());
            return Ok(result);
        }
    }

    let mut last_error = String::new();
    for attempt in 0..=max_retries {
        if jobs.is_cancelled(&job.id) {
            return Err("cancelled by user".to_string());
        }
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(attempt as u64 * 1000)).await;
            warn!(file = %file.name, attempt, "retrying file");
        }
        let _ = jobs.update_progress(&job.id, file.bytes.len() as u64 / 2);

        match ingestor.process_document(&file.name, &file.bytes).await {
            Ok(doc) => {
                let body_result = if opts.compress {
                    compress_if_large(&doc.extracted_text)
                } else {
                    Ok(StoredBody::Plain(doc.extracted_text.clone()))
                };
                let body = match body_result {
                    Ok(body) => body,
                    Err(err) => {
                        let message = err.to_string();
                        let _ = jobs.fail(&job.id, message.clone());
                        return Err(message);
                    }
                };

                let (doc_tags, summary) =
                    tags::enrich(ingestor.router(), &doc.extracted_text).await;
                let record = store.save(NewDocument {
                    therapist_id: opts.therapist_id.clone(),
                    client_id: opts.client_id.clone(),
                    file_name: file.name.clone(),
                    file_type: doc.file_type.clone(),
                    content_hash: hash.clone(),
                    tags: doc_tags,
                    summary,
                    detected_client_name: doc.detected_client_name.clone(),
                    detected_session_date: doc.detected_session_date.clone(),
                    extracted_text: doc.extracted_text.clone(),
                    body,
                });
                dedup.record(hash, record.id.clone());

                // A failed note never loses the stored document; the note can
                // be regenerated once providers recover.
                let note_id = match note::generate_progress_note(
                    ingestor.router(),
                    &doc.extracted_text,
                    record.detected_client_name.as_deref(),
                    opts.client_id.clone(),
                    record.detected_session_date.clone(),
                )
                .await
                {
                    Ok(generated) => Some(store.save_note(&record.id, generated).id),
                    Err(err) => {
                        warn!(file = %file.name, error = %err, "note generation failed, document stored without note");
                        None
                    }
                };

                let result = json!({
                    "documentId": record.id,
                    "fileName": file.name,
                    "fileType": record.file_type,
                    "detectedClientName": record.detected_client_name,
                    "detectedSessionDate": record.detected_session_date,
                    "tags": record.tags,
                    "noteId": note_id,
                    "deduplicated": false,
                });
                let _ = jobs.complete(&job.id, result.clone());
                return Ok(result);
            }
            Err(err) => {
                last_error = err.to_string();
                // Retrying cannot fix a structurally bad upload.
                if matches!(
                    err,
                    IngestError::Unsupported { .. }
                        | IngestError::Empty { .. }
                        | IngestError::TooLarge { .. }
                ) {
                    break;
                }
            }
        }
    }

    let _ = jobs.fail(&job.id, last_error.clone());
    Err(last_error)
}

/// Expand a zip upload into batch files; unsupported entries are dropped here
/// so the pool only sees work it can dispatch.
pub fn unpack_zip(bytes: &[u8]) -> Result<Vec<BatchFile>, IngestError> {
    use crate::pipeline::ingest::FileKind;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))?;
    let mut files = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry
            .name()
            .rsplit('/')
            .next()
            .unwrap_or(entry.name())
            .to_string();
        if FileKind::from_name(&name).is_none() {
            warn!(entry = %name, "dropping unsupported zip entry");
            continue;
        }
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        files.push(BatchFile { name, bytes: buf });
    }
    if files.is_empty() {
        return Err(IngestError::Empty {
            kind: "zip",
            hint: "archive contains no supported files",
        });
    }
    Ok(files)
}
