//! Casenote: document ingestion and multi-provider AI orchestration for a
//! therapy practice. Uploads are extracted to text, annotated with best-effort
//! metadata, and turned into structured clinical notes; every AI call runs
//! through a fallback router so a single provider outage degrades quality
//! instead of availability.

pub mod config;
pub mod pipeline;
pub mod providers;
pub mod router;
pub mod server;
pub mod store;
