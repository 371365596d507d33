use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use core_types::{DocuError, DocuResult, Document, DocumentBackend};
use parking_lot::{Mutex, MutexGuard};
use tracing::info;

pub mod chat;
pub mod library;
pub mod paginator;
pub mod registry;
pub mod resolver;
pub mod upload;

#[cfg(test)]
mod test_support;

pub use chat::{
    ChatSession, ExchangeState, FALLBACK_REPLY, QuickAction, SubmitOutcome, SubmitRejection,
};
pub use library::DocumentLibrary;
pub use paginator::{PREVIEW_WINDOW, PreviewPage, PreviewPaginator};
pub use registry::{DocumentRegistry, SharedRegistry};
pub use resolver::{SourceResolver, display_score, resolve_sources};
pub use upload::{
    UploadFailure, UploadOrchestrator, UploadOutcome, check_upload_size, validate_upload,
};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs a backend call under `timeout`, reporting expiry as a network error.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = DocuResult<T>>,
) -> DocuResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(DocuError::network(format!(
            "request timed out after {}s",
            timeout.as_secs_f32()
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceOptions {
    pub request_timeout: Duration,
    pub greeting: Option<String>,
}

impl Default for WorkspaceOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            greeting: None,
        }
    }
}

/// Everything one user session owns. The registry is created here and shared
/// with each component; nothing outlives the workspace.
pub struct Workspace {
    registry: SharedRegistry,
    chat: ChatSession,
    uploads: UploadOrchestrator,
    library: DocumentLibrary,
    preview: Mutex<PreviewPaginator>,
}

impl Workspace {
    pub fn new(backend: Arc<dyn DocumentBackend>, options: WorkspaceOptions) -> Self {
        let registry = DocumentRegistry::new().into_shared();
        let timeout = options.request_timeout;

        let mut chat =
            ChatSession::new(Arc::clone(&backend), Arc::clone(&registry)).with_timeout(timeout);
        if let Some(greeting) = options.greeting {
            chat = chat.with_greeting(greeting);
        }
        let uploads = UploadOrchestrator::new(Arc::clone(&backend), Arc::clone(&registry))
            .with_timeout(timeout);
        let library = DocumentLibrary::new(backend, Arc::clone(&registry)).with_timeout(timeout);
        let preview = Mutex::new(PreviewPaginator::new(Arc::clone(&registry)));

        info!(timeout_secs = timeout.as_secs(), "workspace opened");
        Self {
            registry,
            chat,
            uploads,
            library,
            preview,
        }
    }

    pub fn registry(&self) -> MutexGuard<'_, DocumentRegistry> {
        self.registry.lock()
    }

    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    pub fn uploads(&self) -> &UploadOrchestrator {
        &self.uploads
    }

    pub fn library(&self) -> &DocumentLibrary {
        &self.library
    }

    pub fn preview(&self) -> MutexGuard<'_, PreviewPaginator> {
        self.preview.lock()
    }

    pub fn set_active(&self, id: Option<&str>) -> DocuResult<()> {
        self.registry.lock().set_active(id)
    }

    /// Reloads the listing and drops preview cursors for documents it no
    /// longer names.
    pub async fn refresh(&self) -> DocuResult<usize> {
        let total = self.library.refresh().await?;
        self.preview.lock().retain_registered();
        Ok(total)
    }

    /// Deletes the document and drops any preview cursor kept for it.
    pub async fn delete_document(&self, id: &str) -> DocuResult<Arc<Document>> {
        let removed = self.library.delete(id).await?;
        self.preview.lock().forget(id);
        Ok(removed)
    }

    pub fn close(&self) {
        self.chat.close();
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.close();
        info!("workspace closed");
    }
}
