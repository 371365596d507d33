use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::chat::Sender;
use crate::document::{Document, DocumentId, MimeKind, PreviewChunk};
use crate::error::{DocuError, DocuResult};

/// One prior turn as sent in `chatHistory`. Always serialized with
/// `sender`; older entries carrying only `isUser` are still accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(try_from = "RawHistoryTurn")]
pub struct HistoryTurn {
    pub sender: Sender,
    pub content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistoryTurn {
    #[serde(default)]
    sender: Option<Sender>,
    #[serde(default)]
    is_user: Option<bool>,
    content: String,
}

impl TryFrom<RawHistoryTurn> for HistoryTurn {
    type Error = String;

    fn try_from(raw: RawHistoryTurn) -> Result<Self, Self::Error> {
        let sender = raw
            .sender
            .or_else(|| raw.is_user.map(Sender::from_is_user))
            .ok_or_else(|| "history turn needs `sender` or `isUser`".to_string())?;
        Ok(Self {
            sender,
            content: raw.content,
        })
    }
}

impl HistoryTurn {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
    #[serde(default)]
    pub chat_history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(alias = "answer")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<Source>,
}

/// A citation as reported by the backend. It names a document but does not
/// own it; `snippet_text` is enough to render it on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(alias = "document_id")]
    pub document_id: DocumentId,
    #[serde(default)]
    pub page: u32,
    #[serde(default, alias = "start_line", skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(default, alias = "end_line", skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, alias = "relevance_score", alias = "confidence_score")]
    pub relevance_score: f64,
    #[serde(default, alias = "snippet_text", alias = "text")]
    pub snippet_text: String,
    #[serde(default, alias = "file_name", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(
        default,
        alias = "section_title",
        skip_serializing_if = "Option::is_none"
    )]
    pub section_title: Option<String>,
}

/// Document metadata as returned by upload and listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, alias = "uploaded_at")]
    pub uploaded_at: Option<Value>,
    #[serde(default, alias = "page_count")]
    pub page_count: Option<u32>,
    #[serde(
        default,
        alias = "preview_urls",
        alias = "previewImageRefs",
        deserialize_with = "null_as_empty"
    )]
    pub preview_urls: Vec<String>,
    #[serde(
        default,
        alias = "preview_zones",
        alias = "previewChunks",
        deserialize_with = "null_as_empty"
    )]
    pub preview_zones: Vec<PreviewChunk>,
}

impl DocumentDescriptor {
    /// Normalizes the descriptor into the canonical [`Document`] shape.
    pub fn into_document(self) -> DocuResult<Document> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(DocuError::backend(
                "Invalid response from server: document id is missing",
            ));
        }
        let mime_kind = MimeKind::from_mime(&self.mime_type).ok_or_else(|| {
            DocuError::backend(format!(
                "Invalid response from server: unsupported document type `{}`",
                self.mime_type
            ))
        })?;
        for chunk in &self.preview_zones {
            chunk.validate()?;
        }

        let name = if self.name.trim().is_empty() {
            id.clone()
        } else {
            self.name
        };

        Ok(Document::new(id, name, mime_kind, self.size)
            .with_uploaded_at(parse_timestamp(self.uploaded_at.as_ref()))
            .with_page_count(self.page_count.unwrap_or(1))
            .with_preview_chunks(self.preview_zones)
            .with_preview_image_refs(self.preview_urls))
    }
}

/// Accepts RFC 3339, a naive ISO timestamp (taken as UTC) or epoch millis.
/// Anything else resolves to the current time.
pub fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    let parsed = match value {
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|naive| naive.and_utc())
                })
        }
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    };
    parsed.unwrap_or_else(Utc::now)
}

pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
