//! Exact-content deduplication: SHA-256 over the raw upload bytes, cached in
//! a bounded FIFO map of hash → document id.

use std::collections::{HashMap, VecDeque};

use base64::Engine;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Base64 of the SHA-256 digest of the upload bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Bounded hash → document-id cache. Insertion order eviction: when the cap
/// is hit, the oldest entry goes, so memory stays flat under sustained load.
pub struct DedupCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

struct Inner {
    map: HashMap<String, String>,
    order: VecDeque<String>,
}

impl DedupCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "dedup cache needs a positive capacity");
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Previously-seen document id for this hash, if any.
    pub fn lookup(&self, hash: &str) -> Option<String> {
        self.inner.lock().map.get(hash).cloned()
    }

    pub fn record(&self, hash: String, document_id: String) {
        let mut inner = self.inner.lock();
        if inner.map.insert(hash.clone(), document_id).is_none() {
            inner.order.push_back(hash);
            if inner.order.len() > self.capacity {
                if let Some(evicted) = inner.order.pop_front() {
                    inner.map.remove(&evicted);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
