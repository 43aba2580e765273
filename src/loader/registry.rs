//! Loader registry: ordered loader lookup by source.

use std::sync::Arc;

use crate::loader::csv::CsvLoader;
use crate::loader::markdown::MarkdownLoader;
use crate::loader::pdf::PdfLoader;
use crate::loader::text::TextLoader;
use crate::loader::{DocumentLoader, LoaderConfig};
use crate::model::{DocumentKind, SourceId};

/// Ordered collection of loaders. Lookup returns the first loader whose
/// `supports` accepts the source; registration order is precedence order.
/// The registry owns no per-stream state, so it is safe to share across
/// threads behind an `Arc`.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, loader: Arc<dyn DocumentLoader>) {
        self.loaders.push(loader);
    }

    /// First registered loader supporting `source`, or `None`.
    pub fn get_loader(&self, source: &SourceId) -> Option<Arc<dyn DocumentLoader>> {
        self.loaders
            .iter()
            .find(|loader| loader.supports(source))
            .cloned()
    }

    /// De-duplicated union of all registered loaders' kinds, in
    /// registration order.
    pub fn supported_kinds(&self) -> Vec<DocumentKind> {
        let mut kinds = Vec::new();
        for loader in &self.loaders {
            for &kind in loader.kinds() {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

/// Registry with the full default loader family.
pub fn default_registry() -> LoaderRegistry {
    let mut registry = LoaderRegistry::new();
    registry.register(Arc::new(TextLoader::plain(LoaderConfig::default())));
    registry.register(Arc::new(MarkdownLoader::new(LoaderConfig::default())));
    registry.register(Arc::new(CsvLoader::new()));
    registry.register(Arc::new(TextLoader::json(LoaderConfig::default())));
    registry.register(Arc::new(TextLoader::xml(LoaderConfig::default())));
    registry.register(Arc::new(TextLoader::html(LoaderConfig::default())));
    registry.register(Arc::new(PdfLoader::new(LoaderConfig::default())));
    registry
}
