use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use core_types::{
    ChatReply, ChatRequest, DocuError, DocuResult, DocumentBackend, DocumentDescriptor,
    DocumentId, DownloadedFile, PreviewChunk, Source, UploadFile,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Backend double with queued replies and a call log. A gated instance holds
/// every chat and upload request until [`ScriptedBackend::release`].
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    gate: Option<Arc<Notify>>,
    chat_requests: Mutex<Vec<ChatRequest>>,
    chat_replies: Mutex<VecDeque<DocuResult<ChatReply>>>,
    uploads: Mutex<VecDeque<DocuResult<DocumentDescriptor>>>,
    uploaded_names: Mutex<Vec<String>>,
    listing: Mutex<Option<DocuResult<Vec<DocumentDescriptor>>>>,
    previews: Mutex<HashMap<DocumentId, Vec<PreviewChunk>>>,
    preview_calls: Mutex<Vec<DocumentId>>,
    delete_error: Mutex<Option<DocuError>>,
    deleted: Mutex<Vec<DocumentId>>,
    download: Mutex<Option<DownloadedFile>>,
}

impl ScriptedBackend {
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Notify::new())),
            ..Self::default()
        }
    }

    pub(crate) fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn push_chat(&self, reply: DocuResult<ChatReply>) {
        self.chat_replies.lock().push_back(reply);
    }

    pub(crate) fn push_upload(&self, reply: DocuResult<DocumentDescriptor>) {
        self.uploads.lock().push_back(reply);
    }

    pub(crate) fn set_listing(&self, listing: DocuResult<Vec<DocumentDescriptor>>) {
        *self.listing.lock() = Some(listing);
    }

    pub(crate) fn set_preview(&self, id: &str, chunks: Vec<PreviewChunk>) {
        self.previews.lock().insert(id.to_string(), chunks);
    }

    pub(crate) fn fail_delete(&self, error: DocuError) {
        *self.delete_error.lock() = Some(error);
    }

    pub(crate) fn set_download(&self, file: DownloadedFile) {
        *self.download.lock() = Some(file);
    }

    pub(crate) fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().clone()
    }

    pub(crate) fn uploaded_names(&self) -> Vec<String> {
        self.uploaded_names.lock().clone()
    }

    pub(crate) fn preview_calls(&self) -> Vec<DocumentId> {
        self.preview_calls.lock().clone()
    }

    pub(crate) fn deleted(&self) -> Vec<DocumentId> {
        self.deleted.lock().clone()
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl DocumentBackend for ScriptedBackend {
    async fn chat(&self, request: ChatRequest) -> DocuResult<ChatReply> {
        self.chat_requests.lock().push(request);
        self.wait_gate().await;
        self.chat_replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DocuError::network("no scripted chat reply")))
    }

    async fn list_documents(&self) -> DocuResult<Vec<DocumentDescriptor>> {
        self.listing
            .lock()
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn upload(&self, file: &UploadFile) -> DocuResult<DocumentDescriptor> {
        self.uploaded_names.lock().push(file.name.clone());
        self.wait_gate().await;
        self.uploads
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(DocuError::network("no scripted upload reply")))
    }

    async fn delete_document(&self, id: &DocumentId) -> DocuResult<()> {
        if let Some(error) = self.delete_error.lock().clone() {
            return Err(error);
        }
        self.deleted.lock().push(id.clone());
        Ok(())
    }

    async fn download_document(&self, id: &DocumentId) -> DocuResult<DownloadedFile> {
        self.download
            .lock()
            .clone()
            .ok_or_else(|| DocuError::backend(format!("no file for {id}")))
    }

    async fn preview_chunks(&self, id: &DocumentId) -> DocuResult<Vec<PreviewChunk>> {
        self.preview_calls.lock().push(id.clone());
        Ok(self.previews.lock().get(id).cloned().unwrap_or_default())
    }
}

pub(crate) fn descriptor(id: &str, name: &str, mime: &str, pages: u32) -> DocumentDescriptor {
    DocumentDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        mime_type: mime.to_string(),
        size: 1024,
        uploaded_at: None,
        page_count: Some(pages),
        preview_urls: Vec::new(),
        preview_zones: Vec::new(),
    }
}

pub(crate) fn reply(content: &str, sources: Vec<Source>) -> ChatReply {
    ChatReply {
        id: None,
        content: content.to_string(),
        sources,
    }
}

pub(crate) fn cite(document_id: &str, page: u32, score: f64) -> Source {
    Source {
        document_id: document_id.to_string(),
        page,
        start_line: Some(1),
        end_line: Some(4),
        relevance_score: score,
        snippet_text: format!("{document_id} page {page}"),
        file_name: None,
        section_title: None,
    }
}
