use std::collections::HashMap;
use std::sync::Arc;

use core_types::{DocuError, DocuResult, Document, DocumentId, PreviewChunk};
use tracing::debug;

use crate::registry::SharedRegistry;

pub const PREVIEW_WINDOW: usize = 5;

/// Visible slice of one document's preview.
#[derive(Debug, Clone)]
pub struct PreviewPage {
    pub document: Arc<Document>,
    pub visible_count: usize,
}

impl PreviewPage {
    pub fn chunks(&self) -> &[PreviewChunk] {
        let end = self.visible_count.min(self.document.total_chunks());
        &self.document.preview_chunks[..end]
    }

    pub fn total_chunks(&self) -> usize {
        self.document.total_chunks()
    }
}

/// Show-more/show-less cursor over each document's preview chunks.
///
/// Only one preview is open at a time. For documents with more chunks than
/// the window, `window_size <= visible_count <= total_chunks` holds after
/// every call.
pub struct PreviewPaginator {
    registry: SharedRegistry,
    window_size: usize,
    selected: Option<DocumentId>,
    visible: HashMap<DocumentId, usize>,
}

impl PreviewPaginator {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            window_size: PREVIEW_WINDOW,
            selected: None,
            visible: HashMap::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// The open preview, unless its document has since left the registry.
    pub fn selected(&self) -> Option<&str> {
        self.selected
            .as_deref()
            .filter(|id| self.registry.lock().contains(id))
    }

    /// Toggles the preview for `id`. Returns whether it is open afterwards.
    pub fn open(&mut self, id: &str) -> DocuResult<bool> {
        self.document(id)?;
        self.visible.insert(id.to_string(), self.window_size);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
            debug!(document_id = %id, "preview closed");
            Ok(false)
        } else {
            self.selected = Some(id.to_string());
            debug!(document_id = %id, "preview opened");
            Ok(true)
        }
    }

    pub fn show_more(&mut self, id: &str) -> DocuResult<usize> {
        let total = self.document(id)?.total_chunks();
        let window = self.window_size;
        let current = self.visible_count(id);
        let next = if total <= window {
            window
        } else {
            (current + window).min(total).max(window)
        };
        self.visible.insert(id.to_string(), next);
        Ok(next)
    }

    pub fn show_less(&mut self, id: &str) -> DocuResult<usize> {
        self.document(id)?;
        self.visible.insert(id.to_string(), self.window_size);
        Ok(self.window_size)
    }

    /// Stored count clamped to the document as currently registered; a
    /// re-registered document may carry fewer chunks than before.
    pub fn visible_count(&self, id: &str) -> usize {
        let window = self.window_size;
        let stored = self.visible.get(id).copied().unwrap_or(window);
        match self.registry.lock().get(id) {
            Some(document) => stored.min(document.total_chunks().max(window)),
            None => window,
        }
    }

    pub fn page(&self, id: &str) -> DocuResult<PreviewPage> {
        let document = self.document(id)?;
        Ok(PreviewPage {
            document,
            visible_count: self.visible_count(id),
        })
    }

    pub fn visible_chunks(&self, id: &str) -> DocuResult<Vec<PreviewChunk>> {
        Ok(self.page(id)?.chunks().to_vec())
    }

    pub fn has_more(&self, id: &str) -> DocuResult<bool> {
        let total = self.document(id)?.total_chunks();
        Ok(self.visible_count(id) < total)
    }

    /// True once the whole preview is showing and it is longer than one window.
    pub fn can_show_less(&self, id: &str) -> DocuResult<bool> {
        let total = self.document(id)?.total_chunks();
        Ok(total > self.window_size && self.visible_count(id) >= total)
    }

    /// Drops cursor state for a document that left the registry.
    pub fn forget(&mut self, id: &str) {
        self.visible.remove(id);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
    }

    /// Drops cursor state for every document no longer in the registry.
    pub fn retain_registered(&mut self) {
        let registry = self.registry.lock();
        let before = self.visible.len();
        self.visible.retain(|id, _| registry.contains(id));
        if self
            .selected
            .as_deref()
            .is_some_and(|id| !registry.contains(id))
        {
            self.selected = None;
        }
        debug!(dropped = before - self.visible.len(), "preview cursors pruned");
    }

    fn document(&self, id: &str) -> DocuResult<Arc<Document>> {
        self.registry
            .lock()
            .get(id)
            .ok_or_else(|| DocuError::invalid_reference(id))
    }
}

#[cfg(test)]
mod tests {
    use core_types::MimeKind;

    use super::*;
    use crate::registry::DocumentRegistry;

    fn doc_with_chunks(id: &str, count: usize) -> Document {
        let chunks = (0..count)
            .map(|i| PreviewChunk {
                page: 1 + (i as u32 / 4),
                start_line: i as u32 * 10,
                end_line: i as u32 * 10 + 9,
                text: format!("chunk {i}"),
                section_title: None,
            })
            .collect();
        Document::new(id, format!("{id}.pdf"), MimeKind::Pdf, 1).with_preview_chunks(chunks)
    }

    fn registry_with(docs: Vec<Document>) -> SharedRegistry {
        let mut registry = DocumentRegistry::new();
        for doc in docs {
            registry.add(doc);
        }
        registry.into_shared()
    }

    fn paginator_with(docs: Vec<Document>) -> PreviewPaginator {
        PreviewPaginator::new(registry_with(docs))
    }

    #[test]
    fn open_toggles_and_resets_window() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 12)]);
        assert!(paginator.open("a").expect("open"));
        assert_eq!(paginator.selected(), Some("a"));
        paginator.show_more("a").expect("more");
        assert_eq!(paginator.visible_count("a"), 10);

        assert!(!paginator.open("a").expect("close"));
        assert_eq!(paginator.selected(), None);
        assert_eq!(paginator.visible_count("a"), PREVIEW_WINDOW);
    }

    #[test]
    fn opening_another_document_switches_selection() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 3), doc_with_chunks("b", 3)]);
        paginator.open("a").expect("open a");
        assert!(paginator.open("b").expect("open b"));
        assert_eq!(paginator.selected(), Some("b"));
    }

    #[test]
    fn show_more_saturates_at_total() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 12)]);
        paginator.open("a").expect("open");
        assert_eq!(paginator.show_more("a").expect("more"), 10);
        assert!(paginator.has_more("a").expect("has more"));
        assert_eq!(paginator.show_more("a").expect("more"), 12);
        assert_eq!(paginator.show_more("a").expect("more"), 12);
        assert!(!paginator.has_more("a").expect("has more"));
        assert!(paginator.can_show_less("a").expect("can show less"));
        assert_eq!(paginator.page("a").expect("page").chunks().len(), 12);
    }

    #[test]
    fn show_less_always_returns_to_window() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 23)]);
        for _ in 0..3 {
            paginator.show_more("a").expect("more");
        }
        assert_eq!(paginator.visible_count("a"), 20);
        assert_eq!(paginator.show_less("a").expect("less"), PREVIEW_WINDOW);
        assert_eq!(paginator.page("a").expect("page").chunks().len(), 5);
    }

    #[test]
    fn small_documents_ignore_more_and_less() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 4)]);
        paginator.open("a").expect("open");
        assert_eq!(paginator.show_more("a").expect("more"), PREVIEW_WINDOW);
        assert_eq!(paginator.show_less("a").expect("less"), PREVIEW_WINDOW);
        assert!(!paginator.has_more("a").expect("has more"));
        assert!(!paginator.can_show_less("a").expect("can show less"));

        let chunks = paginator.visible_chunks("a").expect("chunks");
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "chunk 0");
    }

    #[test]
    fn window_bounds_hold_for_any_sequence() {
        let total = 17;
        let mut paginator = paginator_with(vec![doc_with_chunks("a", total)]);
        let ops = ["more", "more", "less", "open", "more", "more", "more", "more", "open", "more"];
        for op in ops {
            match op {
                "more" => {
                    paginator.show_more("a").expect("more");
                }
                "less" => {
                    paginator.show_less("a").expect("less");
                }
                _ => {
                    paginator.open("a").expect("open");
                }
            }
            let visible = paginator.visible_count("a");
            assert!((PREVIEW_WINDOW..=total).contains(&visible), "{op}: {visible}");
        }
    }

    #[test]
    fn unknown_document_is_invalid_reference() {
        let mut paginator = paginator_with(Vec::new());
        assert!(matches!(
            paginator.open("nope"),
            Err(DocuError::InvalidReference(_))
        ));
        assert!(paginator.show_more("nope").is_err());
    }

    #[test]
    fn forget_clears_selection() {
        let mut paginator = paginator_with(vec![doc_with_chunks("a", 8)]);
        paginator.open("a").expect("open");
        paginator.show_more("a").expect("more");
        paginator.forget("a");
        assert_eq!(paginator.selected(), None);
        assert_eq!(paginator.visible_count("a"), PREVIEW_WINDOW);
    }

    #[test]
    fn shrunken_document_clamps_visible_count() {
        let registry = registry_with(vec![doc_with_chunks("a", 12)]);
        let mut paginator = PreviewPaginator::new(Arc::clone(&registry));
        paginator.open("a").expect("open");
        paginator.show_more("a").expect("more");
        paginator.show_more("a").expect("more");
        assert_eq!(paginator.visible_count("a"), 12);

        registry.lock().add(doc_with_chunks("a", 7));
        assert_eq!(paginator.visible_count("a"), 7);
        assert!(!paginator.has_more("a").expect("has more"));
        assert!(paginator.can_show_less("a").expect("can show less"));
        assert_eq!(paginator.page("a").expect("page").chunks().len(), 7);
        assert_eq!(paginator.show_more("a").expect("more"), 7);

        registry.lock().add(doc_with_chunks("a", 3));
        assert_eq!(paginator.visible_count("a"), PREVIEW_WINDOW);
        assert!(!paginator.can_show_less("a").expect("can show less"));
    }

    #[test]
    fn documents_dropped_from_registry_lose_selection() {
        let registry = registry_with(vec![doc_with_chunks("a", 12), doc_with_chunks("b", 2)]);
        let mut paginator = PreviewPaginator::new(Arc::clone(&registry));
        paginator.open("a").expect("open");
        paginator.show_more("a").expect("more");

        registry.lock().replace_all(vec![doc_with_chunks("b", 2)]);
        assert_eq!(paginator.selected(), None);

        paginator.retain_registered();
        registry.lock().add(doc_with_chunks("a", 12));
        assert_eq!(paginator.selected(), None);
        assert_eq!(paginator.visible_count("a"), PREVIEW_WINDOW);
    }
}
