use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DocuError, DocuResult};

pub type DocumentId = String;

/// Uploads strictly larger than this are rejected before any request is made.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const SHORT_NAME_MAX: usize = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MimeKind {
    Pdf,
    PlainText,
    Docx,
}

impl MimeKind {
    pub const SUPPORTED: [MimeKind; 3] = [MimeKind::Pdf, MimeKind::Docx, MimeKind::PlainText];

    /// Accepts a MIME string (parameters ignored) or one of the short labels.
    pub fn from_mime(value: &str) -> Option<Self> {
        let essence = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" | "pdf" => Some(MimeKind::Pdf),
            "text/plain" | "txt" | "text" => Some(MimeKind::PlainText),
            DOCX_MIME | "docx" => Some(MimeKind::Docx),
            _ => None,
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(MimeKind::Pdf),
            "txt" => Some(MimeKind::PlainText),
            "docx" => Some(MimeKind::Docx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            MimeKind::Pdf => "application/pdf",
            MimeKind::PlainText => "text/plain",
            MimeKind::Docx => DOCX_MIME,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MimeKind::Pdf => "pdf",
            MimeKind::PlainText => "txt",
            MimeKind::Docx => "docx",
        }
    }

    /// `"pdf, docx, txt"`
    pub fn supported_labels() -> String {
        Self::SUPPORTED
            .iter()
            .map(|kind| kind.label())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A span of extracted document text, produced by the backend at upload time.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewChunk {
    pub page: u32,
    #[serde(alias = "start_line")]
    pub start_line: u32,
    #[serde(alias = "end_line")]
    pub end_line: u32,
    #[serde(default)]
    pub text: String,
    #[serde(
        default,
        alias = "section_title",
        skip_serializing_if = "Option::is_none"
    )]
    pub section_title: Option<String>,
}

impl PreviewChunk {
    pub fn validate(&self) -> DocuResult<()> {
        if self.page == 0 {
            return Err(DocuError::backend(
                "malformed preview chunk: page numbers start at 1",
            ));
        }
        if self.end_line < self.start_line {
            return Err(DocuError::backend(format!(
                "malformed preview chunk on page {}: line {} ends before it starts at {}",
                self.page, self.end_line, self.start_line
            )));
        }
        Ok(())
    }

    /// Text with every whitespace run collapsed to one space.
    pub fn display_text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Section title, or `Chunk N` using the 0-based position in the document.
    pub fn label(&self, index: usize) -> String {
        match self.section_title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("Chunk {}", index + 1),
        }
    }

    pub fn location(&self) -> String {
        format!(
            "Page {} • Lines {}-{}",
            self.page, self.start_line, self.end_line
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub mime_kind: MimeKind,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    pub page_count: u32,
    #[serde(default)]
    pub preview_chunks: Vec<PreviewChunk>,
    #[serde(default)]
    pub preview_image_refs: Vec<String>,
}

impl Document {
    pub fn new(
        id: impl Into<DocumentId>,
        name: impl Into<String>,
        mime_kind: MimeKind,
        size_bytes: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            mime_kind,
            size_bytes,
            uploaded_at: Utc::now(),
            page_count: 1,
            preview_chunks: Vec::new(),
            preview_image_refs: Vec::new(),
        }
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count.max(1);
        self
    }

    pub fn with_uploaded_at(mut self, uploaded_at: DateTime<Utc>) -> Self {
        self.uploaded_at = uploaded_at;
        self
    }

    pub fn with_preview_chunks(mut self, chunks: Vec<PreviewChunk>) -> Self {
        self.preview_chunks = chunks;
        self
    }

    pub fn with_preview_image_refs(mut self, refs: Vec<String>) -> Self {
        self.preview_image_refs = refs;
        self
    }

    pub fn total_chunks(&self) -> usize {
        self.preview_chunks.len()
    }

    pub fn short_name(&self) -> String {
        shorten_file_name(&self.name, SHORT_NAME_MAX)
    }
}

fn shorten_file_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }
    let keep = max_len.saturating_sub(3);
    match name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => {
            let head: String = stem.chars().take(keep).collect();
            format!("{head}....{extension}")
        }
        _ => {
            let head: String = name.chars().take(keep).collect();
            format!("{head}...")
        }
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < MIB {
        format!("{:.1} KB", value / KIB)
    } else {
        format!("{:.1} MB", value / MIB)
    }
}
