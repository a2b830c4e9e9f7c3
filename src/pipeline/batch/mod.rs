//! Batch pipeline: dedup, compression, progress tracking, and the worker pool.

pub mod compress;
pub mod dedup;
pub mod progress;
pub mod worker;

pub use compress::{compress_if_large, decompress, StoredBody};
pub use dedup::{content_hash, DedupCache};
pub use progress::{FrameKind, JobError, JobProgress, JobStatus, JobTracker, ProgressFrame};
pub use worker::{unpack_zip, BatchFile, BatchOptions, BatchOutcome, BatchProcessor};
