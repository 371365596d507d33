use std::sync::Arc;
use std::time::Duration;

use core_types::{DocuError, DocuResult, Document, DocumentBackend, DownloadedFile};
use tracing::{info, warn};

use crate::registry::SharedRegistry;
use crate::{DEFAULT_REQUEST_TIMEOUT, bounded};

const FALLBACK_FILE_NAME: &str = "document";

/// Backend-side document management that keeps the registry in step.
pub struct DocumentLibrary {
    backend: Arc<dyn DocumentBackend>,
    registry: SharedRegistry,
    timeout: Duration,
}

impl DocumentLibrary {
    pub fn new(backend: Arc<dyn DocumentBackend>, registry: SharedRegistry) -> Self {
        Self {
            backend,
            registry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the registry contents with the backend's listing and returns
    /// how many documents were registered. Malformed entries are skipped.
    pub async fn refresh(&self) -> DocuResult<usize> {
        let descriptors = bounded(self.timeout, self.backend.list_documents()).await?;
        let mut documents = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            match descriptor.into_document() {
                Ok(document) => documents.push(document),
                Err(error) => warn!(document_id = %id, "skipping listed document: {error}"),
            }
        }

        let mut registry = self.registry.lock();
        let documents: Vec<Document> = documents
            .into_iter()
            .map(|document| match registry.get(&document.id) {
                Some(known) if document.preview_chunks.is_empty() => {
                    let chunks = known.preview_chunks.clone();
                    document.with_preview_chunks(chunks)
                }
                _ => document,
            })
            .collect();
        registry.replace_all(documents);
        Ok(registry.len())
    }

    /// Deletes on the backend first; the registry entry is only removed once
    /// the backend confirms.
    pub async fn delete(&self, id: &str) -> DocuResult<Arc<Document>> {
        if !self.registry.lock().contains(id) {
            return Err(DocuError::invalid_reference(id));
        }
        let id = id.to_string();
        bounded(self.timeout, self.backend.delete_document(&id)).await?;
        let removed = self
            .registry
            .lock()
            .remove(&id)
            .ok_or_else(|| DocuError::invalid_reference(&id))?;
        info!(document_id = %id, "document deleted");
        Ok(removed)
    }

    /// Fetches the stored file. The returned name always has a value: the
    /// server's, else the registered name, else `"document"`.
    pub async fn download(&self, id: &str) -> DocuResult<DownloadedFile> {
        let id = id.to_string();
        let mut file = bounded(self.timeout, self.backend.download_document(&id)).await?;
        let file_name = file
            .file_name
            .take()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.registry.lock().get(&id).map(|doc| doc.name.clone()))
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());
        info!(document_id = %id, file = %file_name, bytes = file.bytes.len(), "document downloaded");
        file.file_name = Some(file_name);
        Ok(file)
    }

    /// Fetches preview chunks for a registered document that has none.
    pub async fn load_preview(&self, id: &str) -> DocuResult<Arc<Document>> {
        let document = self
            .registry
            .lock()
            .get(id)
            .ok_or_else(|| DocuError::invalid_reference(id))?;
        if !document.preview_chunks.is_empty() {
            return Ok(document);
        }
        let id = id.to_string();
        let chunks = bounded(self.timeout, self.backend.preview_chunks(&id)).await?;
        self.registry.lock().attach_preview(&id, chunks)
    }
}
