//! Converter routing and closure-backed converters.

use std::collections::HashMap;
use std::sync::Arc;

use batch_core::{ConversionPort, ConvertError, ConvertFuture, SourceKind, WorkItem};

/// Classifier used to pick a source kind from file content.
pub type Classifier = Arc<dyn Fn(&str) -> SourceKind + Send + Sync>;

/// Routes each item to the converter registered for its source kind.
///
/// Items that were not classified during discovery are classified on the
/// fly. Kinds without a registered converter go to the fallback, or fail
/// with [`ConvertError::NoConverter`] when there is none.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<SourceKind, Arc<dyn ConversionPort>>,
    fallback: Option<Arc<dyn ConversionPort>>,
    classifier: Option<Classifier>,
}

impl ConverterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `classifier` to categorise content.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&str) -> SourceKind + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    /// Converter used for kinds nobody registered for.
    pub fn with_fallback<C: ConversionPort>(mut self, converter: C) -> Self {
        self.fallback = Some(Arc::new(converter));
        self
    }

    /// Register a converter for a source kind.
    pub fn register<C: ConversionPort>(&mut self, kind: SourceKind, converter: C) {
        self.converters.insert(kind, Arc::new(converter));
    }

    /// Get the converter that would handle `kind`.
    pub fn get(&self, kind: &SourceKind) -> Option<Arc<dyn ConversionPort>> {
        self.converters
            .get(kind)
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Check if a dedicated converter exists for a kind.
    pub fn has_converter(&self, kind: &SourceKind) -> bool {
        self.converters.contains_key(kind)
    }

    /// List all kinds with a dedicated converter.
    pub fn kinds(&self) -> Vec<&SourceKind> {
        self.converters.keys().collect()
    }
}

impl ConversionPort for ConverterRegistry {
    fn classify(&self, content: &str) -> SourceKind {
        match &self.classifier {
            Some(classify) => classify(content),
            None => SourceKind::generic(),
        }
    }

    fn convert(&self, item: &WorkItem) -> ConvertFuture {
        let kind = item
            .source_kind
            .clone()
            .unwrap_or_else(|| self.classify(&item.raw_content));

        match self.get(&kind) {
            Some(converter) => converter.convert(item),
            None => Box::pin(std::future::ready(Err(ConvertError::NoConverter(kind)))),
        }
    }
}

/// A simple function-based converter.
pub struct FnConverter<F>
where
    F: Fn(&WorkItem) -> ConvertFuture + Send + Sync + 'static,
{
    handler: F,
}

impl<F> FnConverter<F>
where
    F: Fn(&WorkItem) -> ConvertFuture + Send + Sync + 'static,
{
    /// Create a new function-based converter.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> ConversionPort for FnConverter<F>
where
    F: Fn(&WorkItem) -> ConvertFuture + Send + Sync + 'static,
{
    fn convert(&self, item: &WorkItem) -> ConvertFuture {
        (self.handler)(item)
    }
}

/// Helper macro for creating converters from async blocks.
///
/// The item is cloned into the block, so the body may hold it across awaits.
#[macro_export]
macro_rules! converter {
    (|$item:ident| $body:expr) => {
        $crate::FnConverter::new(|$item: &$crate::WorkItem| {
            let $item = $item.clone();
            Box::pin(async move { $body })
        })
    };
}
