use std::sync::Arc;

use core_types::{DocuError, DocuResult, Document, DocumentId, PreviewChunk};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Registry handle shared by the components of one session.
pub type SharedRegistry = Arc<Mutex<DocumentRegistry>>;

/// Known documents, most recent first, plus the active selection.
///
/// The active pointer always names a key present in `documents`; every
/// mutation that could break that updates both fields under the same `&mut`.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: IndexMap<DocumentId, Arc<Document>>,
    active_id: Option<DocumentId>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Inserts at the front, or replaces an entry with the same id where it
    /// stands. Either way the document becomes active.
    pub fn add(&mut self, document: Document) -> Arc<Document> {
        let id = document.id.clone();
        let document = Arc::new(document);
        match self.documents.get_mut(&id) {
            Some(slot) => {
                *slot = Arc::clone(&document);
                info!(document_id = %id, "document replaced");
            }
            None => {
                self.documents.shift_insert(0, id.clone(), Arc::clone(&document));
                info!(document_id = %id, total = self.documents.len(), "document added");
            }
        }
        self.active_id = Some(id);
        document
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<Document>> {
        let removed = self.documents.shift_remove(id)?;
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        info!(document_id = %id, "document removed");
        Some(removed)
    }

    pub fn set_active(&mut self, id: Option<&str>) -> DocuResult<()> {
        match id {
            None => {
                self.active_id = None;
                Ok(())
            }
            Some(id) if self.documents.contains_key(id) => {
                self.active_id = Some(id.to_string());
                debug!(document_id = %id, "active document changed");
                Ok(())
            }
            Some(id) => {
                warn!(document_id = %id, "refusing to activate unknown document");
                Err(DocuError::invalid_reference(id))
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.documents.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn list(&self) -> Vec<Arc<Document>> {
        self.documents.values().cloned().collect()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active(&self) -> Option<Arc<Document>> {
        self.active_id
            .as_deref()
            .and_then(|id| self.documents.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Swaps in a fresh listing in the given order. The active pointer
    /// survives only if its id is still listed.
    pub fn replace_all(&mut self, documents: Vec<Document>) {
        let mut next = IndexMap::with_capacity(documents.len());
        for document in documents {
            next.entry(document.id.clone())
                .or_insert_with(|| Arc::new(document));
        }
        self.documents = next;
        let stale = self
            .active_id
            .as_deref()
            .is_some_and(|active| !self.documents.contains_key(active));
        if stale {
            self.active_id = None;
        }
        info!(total = self.documents.len(), "document listing replaced");
    }

    /// Fills in preview chunks for a document that has none yet. Chunks that
    /// are already attached are never replaced. The active pointer is left
    /// alone.
    pub fn attach_preview(
        &mut self,
        id: &str,
        chunks: Vec<PreviewChunk>,
    ) -> DocuResult<Arc<Document>> {
        let slot = self
            .documents
            .get_mut(id)
            .ok_or_else(|| DocuError::invalid_reference(id))?;
        if !slot.preview_chunks.is_empty() {
            return Ok(Arc::clone(slot));
        }
        for chunk in &chunks {
            chunk.validate()?;
        }
        let updated = Arc::new(
            slot.as_ref()
                .clone()
                .with_preview_chunks(chunks),
        );
        *slot = Arc::clone(&updated);
        debug!(document_id = %id, chunks = updated.total_chunks(), "preview attached");
        Ok(updated)
    }
}
