use async_trait::async_trait;

use crate::document::{DocumentId, MimeKind, PreviewChunk};
use crate::error::DocuResult;
use crate::wire::{ChatReply, ChatRequest, DocumentDescriptor};

/// A file picked by the user, not yet validated.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn mime_kind(&self) -> Option<MimeKind> {
        MimeKind::from_mime(&self.mime_type)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// From `Content-Disposition`, when the server sent one.
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The remote service that stores documents and answers questions.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> DocuResult<ChatReply>;

    async fn list_documents(&self) -> DocuResult<Vec<DocumentDescriptor>>;

    async fn upload(&self, file: &UploadFile) -> DocuResult<DocumentDescriptor>;

    async fn delete_document(&self, id: &DocumentId) -> DocuResult<()>;

    async fn download_document(&self, id: &DocumentId) -> DocuResult<DownloadedFile>;

    async fn preview_chunks(&self, id: &DocumentId) -> DocuResult<Vec<PreviewChunk>>;
}
