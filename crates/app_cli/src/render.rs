use std::fmt::Write as _;

use core_orchestrator::{PreviewPage, SubmitRejection, UploadOutcome};
use core_types::{ChatMessage, Document, Sender, format_file_size};

pub fn document_line(document: &Document, active: bool) -> String {
    let marker = if active { '*' } else { ' ' };
    let pages = if document.page_count == 1 {
        "1 page".to_string()
    } else {
        format!("{} pages", document.page_count)
    };
    format!(
        "{marker} {:<20}  {:<4}  {:>9}  {:<9}  {}",
        document.short_name(),
        document.mime_kind.label(),
        format_file_size(document.size_bytes),
        pages,
        document.id
    )
}

pub fn message(message: &ChatMessage) -> String {
    let speaker = match message.sender {
        Sender::User => "you",
        Sender::Assistant => "assistant",
    };
    let mut out = format!("{speaker}> {}", message.content);
    if !message.sources.is_empty() {
        out.push_str("\n  sources:");
    }
    for (index, source) in message.sources.iter().enumerate() {
        let _ = write!(out, "\n  [{}] {}", index + 1, source.title());
        if let Some(lines) = source.line_range() {
            let _ = write!(out, " ({lines})");
        }
        let _ = write!(out, "  relevance {:.2}", source.display_score);
        if !source.is_resolved() {
            out.push_str("  (document not loaded)");
        }
        let excerpt = source.excerpt().trim();
        if !excerpt.is_empty() {
            let _ = write!(out, "\n      \"{excerpt}\"");
        }
    }
    out
}

pub fn preview(page: &PreviewPage, has_more: bool, can_show_less: bool) -> String {
    let document = &page.document;
    let mut out = format!("preview of {} ({})", document.name, document.id);
    if page.total_chunks() == 0 {
        out.push_str("\n  no preview text available");
        return out;
    }
    for (index, chunk) in page.chunks().iter().enumerate() {
        let _ = write!(
            out,
            "\n  {}  [{}]\n    {}",
            chunk.label(index),
            chunk.location(),
            chunk.display_text()
        );
    }
    let shown = page.chunks().len();
    let total = page.total_chunks();
    if has_more {
        let _ = write!(
            out,
            "\n  showing {shown} of {total}; `more {}` for more",
            document.id
        );
    } else if can_show_less {
        let _ = write!(out, "\n  showing all {total}; `less {}` to collapse", document.id);
    }
    out
}

pub fn rejection(reason: SubmitRejection) -> &'static str {
    match reason {
        SubmitRejection::BlankQuestion => "type a question first",
        SubmitRejection::Busy => "still waiting for the previous answer",
        SubmitRejection::Closed => "the chat session is closed",
        SubmitRejection::NeedsQuestionText => "type what to search for, e.g. `search revenue`",
    }
}

pub fn upload_summary(outcome: &UploadOutcome) -> String {
    let mut out = String::new();
    for document in &outcome.registered {
        let _ = writeln!(out, "uploaded {} as {}", document.name, document.id);
    }
    match outcome.error_message() {
        Some(error) => {
            let _ = write!(out, "upload stopped: {error}");
        }
        None => {
            let count = outcome.registered.len();
            let _ = write!(
                out,
                "{count} file{} uploaded",
                if count == 1 { "" } else { "s" }
            );
        }
    }
    out
}
