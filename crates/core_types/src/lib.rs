pub mod backend;
pub mod chat;
pub mod document;
pub mod error;
pub mod wire;

pub use backend::{DocumentBackend, DownloadedFile, UploadFile};
pub use chat::{ChatMessage, MessageId, ResolvedSource, Sender};
pub use document::{
    Document, DocumentId, MAX_UPLOAD_BYTES, MimeKind, PreviewChunk, format_file_size,
};
pub use error::{DocuError, DocuResult};
pub use wire::{ChatReply, ChatRequest, DocumentDescriptor, HistoryTurn, Source};
