//! In-memory job progress: an injected, bounded tracker shared between the
//! batch workers, the polling endpoints, and the WebSocket push channel.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One file's processing lifecycle. Created on upload start, mutated as bytes
/// move, finalized on completion or error, evicted after the retention window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub id: String,
    pub file_name: String,
    pub total_size: u64,
    pub processed_size: u64,
    pub percentage: u8,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Frame pushed to WebSocket subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressFrame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub data: serde_json::Value,
    #[serde(skip)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameKind {
    Progress,
    Complete,
    Error,
    BatchProgress,
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {id} already finished ({status:?}) and cannot be cancelled")]
    NotCancellable { id: String, status: JobStatus },
}

/// Finished jobs linger this long (hours) for status polling, then get evicted.
const RETENTION_HOURS: i64 = 1;

pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobProgress>>,
    frames: broadcast::Sender<ProgressFrame>,
}

impl JobTracker {
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(256);
        Self {
            jobs: RwLock::new(HashMap::new()),
            frames,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressFrame> {
        self.frames.subscribe()
    }

    pub fn create(
        &self,
        file_name: &str,
        total_size: u64,
        session_id: Option<String>,
    ) -> JobProgress {
        self.evict_stale();
        let job = JobProgress {
            id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            total_size,
            processed_size: 0,
            percentage: 0,
            status: JobStatus::Pending,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            session_id,
        };
        self.jobs.write().insert(job.id.clone(), job.clone());
        job
    }

    pub fn get(&self, id: &str) -> Option<JobProgress> {
        self.jobs.read().get(id).cloned()
    }

    pub fn active_jobs(&self) -> Vec<JobProgress> {
        self.jobs
            .read()
            .values()
            .filter(|j| !j.status.is_finished())
            .cloned()
            .collect()
    }

    /// Record forward progress and push a `progress` frame.
    pub fn update_progress(&self, id: &str, processed_size: u64) -> Result<(), JobError> {
        let frame = {
            let mut jobs = self.jobs.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.into()))?;
            if job.status.is_finished() {
                // Late worker update after cancellation; result delivery is
                // suppressed, not an error.
                return Ok(());
            }
            job.status = JobStatus::Processing;
            job.processed_size = processed_size.min(job.total_size);
            job.percentage = if job.total_size == 0 {
                100
            } else {
                ((job.processed_size * 100) / job.total_size) as u8
            };
            ProgressFrame {
                kind: FrameKind::Progress,
                data: serde_json::to_value(&*job).unwrap_or_default(),
                session_id: job.session_id.clone(),
            }
        };
        let _ = self.frames.send(frame);
        Ok(())
    }

    pub fn complete(&self, id: &str, result: serde_json::Value) -> Result<(), JobError> {
        self.finalize(id, JobStatus::Completed, None, Some(result), FrameKind::Complete)
    }

    pub fn fail(&self, id: &str, error: String) -> Result<(), JobError> {
        self.finalize(id, JobStatus::Failed, Some(error), None, FrameKind::Error)
    }

    /// Cooperative cancellation: flips a live job to failed. Workers observe
    /// the flip between retry attempts; in-flight provider calls are not
    /// aborted, their results are just dropped.
    pub fn cancel(&self, id: &str) -> Result<JobProgress, JobError> {
        let frame;
        let snapshot;
        {
            let mut jobs = self.jobs.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.into()))?;
            if job.status.is_finished() {
                return Err(JobError::NotCancellable {
                    id: id.to_string(),
                    status: job.status,
                });
            }
            job.status = JobStatus::Failed;
            job.error = Some("cancelled by user".to_string());
            job.end_time = Some(Utc::now());
            snapshot = job.clone();
            frame = ProgressFrame {
                kind: FrameKind::Error,
                data: serde_json::to_value(&*job).unwrap_or_default(),
                session_id: job.session_id.clone(),
            };
        }
        let _ = self.frames.send(frame);
        Ok(snapshot)
    }

    /// True once a job has been cancelled (or otherwise finished); workers
    /// poll this between attempts.
    pub fn is_cancelled(&self, id: &str) -> bool {
        self.jobs
            .read()
            .get(id)
            .map(|j| j.status == JobStatus::Failed)
            .unwrap_or(true)
    }

    /// Push a batch-level summary frame (files completed / total).
    pub fn broadcast_batch(&self, session_id: Option<String>, data: serde_json::Value) {
        let _ = self.frames.send(ProgressFrame {
            kind: FrameKind::BatchProgress,
            data,
            session_id,
        });
    }

    fn finalize(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<String>,
        result: Option<serde_json::Value>,
        kind: FrameKind,
    ) -> Result<(), JobError> {
        let frame = {
            let mut jobs = self.jobs.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::NotFound(id.into()))?;
            if job.status.is_finished() {
                // Cancelled while the worker was mid-flight; suppress.
                return Ok(());
            }
            job.status = status;
            job.error = error;
            job.result = result;
            job.end_time = Some(Utc::now());
            if status == JobStatus::Completed {
                job.processed_size = job.total_size;
                job.percentage = 100;
            }
            ProgressFrame {
                kind,
                data: serde_json::to_value(&*job).unwrap_or_default(),
                session_id: job.session_id.clone(),
            }
        };
        let _ = self.frames.send(frame);
        Ok(())
    }

    fn evict_stale(&self) {
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);
        self.jobs
            .write()
            .retain(|_, job| !job.status.is_finished() || job.end_time.map(|t| t > cutoff).unwrap_or(true));
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lifecycle_pending_processing_completed() {
        let tracker = JobTracker::new();
        let job = tracker.create("session.pdf", 1000, None);
        assert_eq!(job.status, JobStatus::Pending);

        tracker.update_progress(&job.id, 500).unwrap();
        let mid = tracker.get(&job.id).unwrap();
        assert_eq!(mid.status, JobStatus::Processing);
        assert_eq!(mid.percentage, 50);

        tracker.complete(&job.id, json!({"documentId": "d1"})).unwrap();
        let done = tracker.get(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.percentage, 100);
        assert!(done.end_time.is_some());
    }

    #[test]
    fn cancelling_a_finished_job_is_an_error() {
        let tracker = JobTracker::new();
        let job = tracker.create("a.txt", 10, None);
        tracker.complete(&job.id, json!({})).unwrap();

        let err = tracker.cancel(&job.id).unwrap_err();
        assert!(matches!(err, JobError::NotCancellable { .. }));
    }

    #[test]
    fn cancelling_a_live_job_flips_it_to_failed() {
        let tracker = JobTracker::new();
        let job = tracker.create("a.txt", 10, None);
        tracker.update_progress(&job.id, 2).unwrap();

        let cancelled = tracker.cancel(&job.id).unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);
        assert!(tracker.is_cancelled(&job.id));
        // Late worker completion is suppressed, not surfaced.
        tracker.complete(&job.id, json!({})).unwrap();
        assert_eq!(tracker.get(&job.id).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        assert!(matches!(
            tracker.cancel("nope"),
            Err(JobError::NotFound(_))
        ));
        assert!(tracker.get("nope").is_none());
    }

    #[test]
    fn active_jobs_excludes_finished() {
        let tracker = JobTracker::new();
        let a = tracker.create("a.txt", 10, None);
        let _b = tracker.create("b.txt", 10, None);
        tracker.complete(&a.id, json!({})).unwrap();
        let active = tracker.active_jobs();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].file_name, "b.txt");
    }

    #[tokio::test]
    async fn frames_reach_subscribers_with_session_filter_data() {
        let tracker = JobTracker::new();
        let mut rx = tracker.subscribe();
        let job = tracker.create("a.txt", 10, Some("sess-1".to_string()));
        tracker.update_progress(&job.id, 5).unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Progress);
        assert_eq!(frame.session_id.as_deref(), Some("sess-1"));
        assert_eq!(frame.data["fileName"], "a.txt");
    }

    #[test]
    fn frame_kind_serializes_kebab_case() {
        let frame = ProgressFrame {
            kind: FrameKind::BatchProgress,
            data: json!({}),
            session_id: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "batch-progress");
    }
}
