//! Per-file conversion types: inputs, outcomes and the batch aggregate.

use serde::{Deserialize, Serialize};

use crate::naming::{disambiguate_names, sort_results};

/// Category of a source file, used to pick a conversion variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceKind(pub String);

impl SourceKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// The kind used when no classifier has a better answer.
    pub fn generic() -> Self {
        Self::new("generic")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of input: a single source file discovered in a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Path relative to the extracted working directory, `/` separated.
    pub path: String,
    /// File contents.
    pub raw_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<SourceKind>,
}

impl WorkItem {
    pub fn new(path: impl Into<String>, raw_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            raw_content: raw_content.into(),
            source_kind: None,
        }
    }

    pub fn with_source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = Some(kind);
        self
    }

    /// File name component of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Outcome of converting one work item.
///
/// Every work item yields exactly one result. `success` is always set
/// explicitly by the constructor that produced the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Path of the source item.
    pub original: String,
    /// Name of the produced artifact.
    pub converted: Option<String>,
    /// Converted content.
    pub content: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn succeeded(
        original: impl Into<String>,
        converted: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            original: original.into(),
            converted: Some(converted.into()),
            content: Some(content.into()),
            success: true,
            error: None,
        }
    }

    pub fn failed(original: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            converted: None,
            content: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// A named artifact handed to the archive for packing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedContent {
    pub name: String,
    pub content: String,
}

/// Aggregate outcome of a whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total_files: usize,
    /// Number of successful conversions.
    pub processed_files: usize,
    pub failed_files: usize,
    /// Successful share of all files, as a rounded percentage:
    /// `round(processed_files / total_files * 100)`, 0 for an empty batch.
    /// Three successes out of five files give 60.
    pub success_rate: u32,
    /// Per-file results in natural path order.
    pub results: Vec<ConversionResult>,
    /// Reference to the packed output bundle, when packing succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    /// Why packing failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging_error: Option<String>,
}

impl BatchResult {
    /// Aggregate per-file results, imposing the deterministic output order
    /// and unique artifact names.
    pub fn from_results(mut results: Vec<ConversionResult>) -> Self {
        sort_results(&mut results);
        disambiguate_names(&mut results);

        let processed_files = results.iter().filter(|r| r.success).count();
        let total_files = results.len();
        let failed_files = total_files - processed_files;

        Self {
            total_files,
            processed_files,
            failed_files,
            success_rate: success_rate(processed_files, total_files),
            results,
            bundle: None,
            packaging_error: None,
        }
    }

    /// Artifacts for every successful result, in result order.
    pub fn artifacts(&self) -> Vec<NamedContent> {
        self.results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| match (&r.converted, &r.content) {
                (Some(name), Some(content)) => Some(NamedContent {
                    name: name.clone(),
                    content: content.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn with_bundle(mut self, bundle: impl Into<String>) -> Self {
        self.bundle = Some(bundle.into());
        self
    }

    pub fn with_packaging_error(mut self, error: impl Into<String>) -> Self {
        self.packaging_error = Some(error.into());
        self
    }
}

fn success_rate(processed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0).round() as u32
}
