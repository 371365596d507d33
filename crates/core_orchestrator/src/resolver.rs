use core_types::{ResolvedSource, Source};
use tracing::debug;

use crate::registry::{DocumentRegistry, SharedRegistry};

/// Correlates backend citations with registry entries.
#[derive(Clone)]
pub struct SourceResolver {
    registry: SharedRegistry,
}

impl SourceResolver {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, sources: &[Source]) -> Vec<ResolvedSource> {
        let registry = self.registry.lock();
        resolve_sources(&registry, sources)
    }
}

/// Returns one entry per input, in input order. Citations whose document is
/// not registered are kept unresolved.
pub fn resolve_sources(registry: &DocumentRegistry, sources: &[Source]) -> Vec<ResolvedSource> {
    sources
        .iter()
        .map(|source| {
            let document = registry.get(&source.document_id);
            if document.is_none() {
                debug!(document_id = %source.document_id, "citation references unknown document");
            }
            ResolvedSource {
                source: source.clone(),
                document,
                display_score: display_score(source.relevance_score),
            }
        })
        .collect()
}

/// Relevance clamped to `[0, 1]` and rounded to two decimals.
pub fn display_score(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}
