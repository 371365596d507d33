use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use core_types::{
    DocuError, DocuResult, Document, DocumentBackend, MAX_UPLOAD_BYTES, MimeKind, UploadFile,
    format_file_size,
};
use tracing::{info, warn};

use crate::registry::SharedRegistry;
use crate::{DEFAULT_REQUEST_TIMEOUT, bounded};

/// Size limit on its own, so callers can check a file before reading it.
pub fn check_upload_size(name: &str, size: u64) -> DocuResult<()> {
    if size > MAX_UPLOAD_BYTES {
        return Err(DocuError::validation(format!(
            "`{name}` is {}; files must be at most {}",
            format_file_size(size),
            format_file_size(MAX_UPLOAD_BYTES)
        )));
    }
    Ok(())
}

/// Local checks run before a file is sent anywhere.
pub fn validate_upload(file: &UploadFile) -> DocuResult<MimeKind> {
    check_upload_size(&file.name, file.size())?;
    file.mime_kind().ok_or_else(|| {
        DocuError::validation(format!(
            "`{}` has unsupported type `{}`; supported kinds are {}",
            file.name,
            file.mime_type,
            MimeKind::supported_labels()
        ))
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadFailure {
    /// Another batch was still running.
    Busy,
    File { file_name: String, error: DocuError },
}

#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    pub registered: Vec<Arc<Document>>,
    pub failure: Option<UploadFailure>,
}

impl UploadOutcome {
    pub fn busy() -> Self {
        Self {
            registered: Vec::new(),
            failure: Some(UploadFailure::Busy),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        match self.failure.as_ref()? {
            UploadFailure::Busy => Some("An upload is already in progress".to_string()),
            UploadFailure::File { file_name, error } => Some(format!("{file_name}: {error}")),
        }
    }
}

/// Sends files to the backend one at a time and registers each accepted
/// document as soon as it comes back.
pub struct UploadOrchestrator {
    backend: Arc<dyn DocumentBackend>,
    registry: SharedRegistry,
    timeout: Duration,
    running: AtomicBool,
}

impl UploadOrchestrator {
    pub fn new(backend: Arc<dyn DocumentBackend>, registry: SharedRegistry) -> Self {
        Self {
            backend,
            registry,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_uploading(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stops at the first failing file. Documents registered before the
    /// failure stay registered.
    pub async fn upload(&self, files: Vec<UploadFile>) -> UploadOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("upload batch rejected: another batch is running");
            return UploadOutcome::busy();
        }
        let _running = RunningGuard(&self.running);

        let mut outcome = UploadOutcome::default();
        let batch_size = files.len();
        for file in files {
            match self.upload_one(&file).await {
                Ok(document) => outcome.registered.push(document),
                Err(error) => {
                    warn!(
                        file = %file.name,
                        kind = error.kind(),
                        registered = outcome.registered.len(),
                        batch_size,
                        "upload batch stopped: {error}"
                    );
                    outcome.failure = Some(UploadFailure::File {
                        file_name: file.name,
                        error,
                    });
                    break;
                }
            }
        }
        outcome
    }

    async fn upload_one(&self, file: &UploadFile) -> DocuResult<Arc<Document>> {
        let kind = validate_upload(file)?;
        info!(file = %file.name, kind = kind.label(), size = file.size(), "uploading file");
        let descriptor = bounded(self.timeout, self.backend.upload(file)).await?;
        let document = descriptor.into_document()?;
        Ok(self.registry.lock().add(document))
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
