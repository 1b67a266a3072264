//! Backpressure controller: bounded in-flight requests per document.
//!
//! A slot is held by a [`SlotGuard`]; dropping the guard releases the slot,
//! so every exit path (success, error, early return, panic unwind) pairs
//! acquire with release. Entries are removed when their count reaches zero.

use std::collections::HashMap;
use std::sync::Mutex;

use ctxloom_core::ContextError;

type DocumentKey = (String, String);

/// In-flight counters keyed by `(projectId, documentId)`.
#[derive(Debug)]
pub struct InFlightSlots {
    limit: usize,
    counts: Mutex<HashMap<DocumentKey, usize>>,
}

impl InFlightSlots {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Take a slot, or reject immediately without consuming one.
    pub fn try_acquire(
        &self,
        project_id: &str,
        document_id: &str,
    ) -> Result<SlotGuard<'_>, ContextError> {
        let key = (project_id.to_string(), document_id.to_string());
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let in_flight = counts.get(&key).copied().unwrap_or(0);
        if in_flight >= self.limit {
            return Err(ContextError::Backpressure {
                in_flight,
                limit: self.limit,
            });
        }
        counts.insert(key.clone(), in_flight + 1);
        Ok(SlotGuard { slots: self, key })
    }

    /// Current in-flight count for a document.
    pub fn in_flight(&self, project_id: &str, document_id: &str) -> usize {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .get(&(project_id.to_string(), document_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Number of documents with at least one request in flight.
    pub fn tracked_documents(&self) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    fn release(&self, key: &DocumentKey) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(key);
            }
        }
    }
}

/// One held slot. Released on drop.
#[derive(Debug)]
pub struct SlotGuard<'a> {
    slots: &'a InFlightSlots,
    key: DocumentKey,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.slots.release(&self.key);
    }
}
