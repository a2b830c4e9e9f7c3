//! Document persistence seam. The real practice-management database is an
//! external collaborator; this crate only needs a narrow store interface and
//! ships an in-memory implementation for serving and tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::config::STORED_TEXT_LIMIT;
use crate::pipeline::batch::compress::StoredBody;
use crate::pipeline::ingest::sanitize::clip;
use crate::pipeline::note::ProgressNote;

/// A persisted document: preview text plus the (possibly compressed) full body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: String,
    pub therapist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub content_hash: String,
    /// First 5000 characters, what list views and search indexes read.
    pub text_preview: String,
    pub body: StoredBody,
    pub tags: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_session_date: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the pipeline knows about a document before it gets an identity.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub therapist_id: String,
    pub client_id: Option<String>,
    pub file_name: String,
    pub file_type: String,
    pub content_hash: String,
    pub extracted_text: String,
    pub body: StoredBody,
    pub tags: Vec<String>,
    pub summary: String,
    pub detected_client_name: Option<String>,
    pub detected_session_date: Option<String>,
}

/// A progress note persisted against a stored document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteRecord {
    pub id: String,
    pub document_id: String,
    #[serde(flatten)]
    pub note: ProgressNote,
}

pub trait DocumentStore: Send + Sync {
    fn save(&self, doc: NewDocument) -> DocumentRecord;
    fn get(&self, id: &str) -> Option<DocumentRecord>;
    /// Exact-content lookup, the durable side of upload dedup.
    fn find_by_hash(&self, content_hash: &str) -> Option<DocumentRecord>;
    fn for_therapist(&self, therapist_id: &str) -> Vec<DocumentRecord>;
    fn count(&self) -> usize;
    fn save_note(&self, document_id: &str, note: ProgressNote) -> NoteRecord;
    fn note_for_document(&self, document_id: &str) -> Option<NoteRecord>;
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<String, DocumentRecord>>,
    notes: RwLock<HashMap<String, NoteRecord>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn save(&self, doc: NewDocument) -> DocumentRecord {
        let record = DocumentRecord {
            id: Uuid::new_v4().to_string(),
            therapist_id: doc.therapist_id,
            client_id: doc.client_id,
            file_name: doc.file_name,
            file_type: doc.file_type,
            content_hash: doc.content_hash,
            text_preview: clip(&doc.extracted_text, STORED_TEXT_LIMIT).to_string(),
            body: doc.body,
            tags: doc.tags,
            summary: doc.summary,
            detected_client_name: doc.detected_client_name,
            detected_session_date: doc.detected_session_date,
            created_at: Utc::now(),
        };
        self.docs.write().insert(record.id.clone(), record.clone());
        record
    }

    fn get(&self, id: &str) -> Option<DocumentRecord> {
        self.docs.read().get(id).cloned()
    }

    fn find_by_hash(&self, content_hash: &str) -> Option<DocumentRecord> {
        self.docs
            .read()
            .values()
            .find(|d| d.content_hash == content_hash)
            .cloned()
    }

    fn for_therapist(&self, therapist_id: &str) -> Vec<DocumentRecord> {
        let mut docs: Vec<DocumentRecord> = self
            .docs
            .read()
            .values()
            .filter(|d| d.therapist_id == therapist_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs
    }

    fn count(&self) -> usize {
        self.docs.read().len()
    }

    fn save_note(&self, document_id: &str, note: ProgressNote) -> NoteRecord {
        let record = NoteRecord {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            note,
        };
        self.notes
            .write()
            .insert(record.id.clone(), record.clone());
        record
    }

    fn note_for_document(&self, document_id: &str) -> Option<NoteRecord> {
        self.notes
            .read()
            .values()
            .find(|n| n.document_id == document_id)
            .cloned()
    }
}
