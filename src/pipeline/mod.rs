//! The document pipeline: ingestion, date/tag heuristics, note generation,
//! roster import, and batch orchestration.

pub mod batch;
pub mod dates;
pub mod ingest;
pub mod note;
pub mod roster;
pub mod tags;
