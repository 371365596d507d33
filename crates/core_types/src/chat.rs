use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::Document;
use crate::wire::{HistoryTurn, Source};

pub type MessageId = String;

/// Conversation side. Older history entries used `"ai"`/`"bot"`; a bare
/// `isUser` flag is mapped by [`HistoryTurn`] deserialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai", alias = "bot")]
    Assistant,
}

impl Sender {
    pub fn from_is_user(is_user: bool) -> Self {
        if is_user {
            Sender::User
        } else {
            Sender::Assistant
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }
}

/// A citation after correlation with the document registry.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub source: Source,
    pub document: Option<Arc<Document>>,
    /// Relevance rounded to two decimals. `source.relevance_score` keeps the
    /// backend's precision.
    pub display_score: f64,
}

impl ResolvedSource {
    pub fn is_resolved(&self) -> bool {
        self.document.is_some()
    }

    pub fn document_id(&self) -> &str {
        &self.source.document_id
    }

    pub fn title(&self) -> String {
        match &self.document {
            Some(document) => format!("{} · Page {}", document.name, self.source.page),
            None => match self.source.file_name.as_deref() {
                Some(name) if !name.trim().is_empty() => {
                    format!("{name} · Page {}", self.source.page)
                }
                _ => format!("Page {}", self.source.page),
            },
        }
    }

    pub fn excerpt(&self) -> &str {
        &self.source.snippet_text
    }

    pub fn line_range(&self) -> Option<String> {
        match (self.source.start_line, self.source.end_line) {
            (Some(start), Some(end)) => Some(format!("Lines {start}-{end}")),
            (Some(start), None) => Some(format!("Line {start}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    pub sources: Vec<ResolvedSource>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::User,
            created_at: Utc::now(),
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, sources: Vec<ResolvedSource>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            sender: Sender::Assistant,
            created_at: Utc::now(),
            sources,
        }
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn to_turn(&self) -> HistoryTurn {
        HistoryTurn::new(self.sender, self.content.clone())
    }
}
