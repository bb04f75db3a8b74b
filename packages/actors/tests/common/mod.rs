#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{BatchOrchestrator, JobRegistry};
use batch_core::{
    ArchiveError, ArchiveFuture, ArchivePort, BatchConfig, ConversionPort, ConvertError,
    ConvertFuture, NamedContent, SourceKind, WorkDir, WorkItem,
};

/// What the scripted converter does for one path.
#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Delay(Duration),
    Hang,
    Panic,
}

#[derive(Default)]
pub struct Stats {
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Stats {
    pub fn calls_for(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlight(Arc<Stats>);

impl InFlight {
    fn enter(stats: Arc<Stats>) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Converter whose outcome per path is decided up front.
///
/// Successful conversions upper-case the content.
pub struct ScriptedConverter {
    behaviors: HashMap<String, Behavior>,
    default: Behavior,
    unclassifiable: Option<&'static str>,
    pub stats: Arc<Stats>,
}

impl ScriptedConverter {
    pub fn new(default: Behavior) -> Self {
        Self {
            behaviors: HashMap::new(),
            default,
            unclassifiable: None,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with(mut self, path: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(path.to_string(), behavior);
        self
    }

    /// Make classification panic on files whose content is exactly `content`.
    pub fn with_unclassifiable(mut self, content: &'static str) -> Self {
        self.unclassifiable = Some(content);
        self
    }
}

impl ConversionPort for ScriptedConverter {
    fn classify(&self, content: &str) -> SourceKind {
        if self.unclassifiable == Some(content) {
            panic!("cannot classify {content:?}");
        }
        SourceKind::generic()
    }

    fn convert(&self, item: &WorkItem) -> ConvertFuture {
        *self
            .stats
            .calls
            .lock()
            .unwrap()
            .entry(item.path.clone())
            .or_default() += 1;

        let behavior = self
            .behaviors
            .get(&item.path)
            .cloned()
            .unwrap_or_else(|| self.default.clone());
        let content = item.raw_content.to_uppercase();
        let stats = Arc::clone(&self.stats);

        Box::pin(async move {
            let _guard = InFlight::enter(stats);
            match behavior {
                Behavior::Succeed => Ok(content),
                Behavior::Fail(message) => Err(ConvertError::failed(message)),
                Behavior::Delay(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(content)
                }
                Behavior::Hang => std::future::pending().await,
                Behavior::Panic => panic!("scripted panic"),
            }
        })
    }
}

/// Archive that "extracts" a fixed set of files into a temp directory and
/// keeps packed bundles in memory.
pub struct MemoryArchive {
    files: Vec<(String, String)>,
    root: tempfile::TempDir,
    pub fail_extract: bool,
    pub fail_pack: bool,
    pub extracted: Mutex<Vec<PathBuf>>,
    pub packed: Mutex<Vec<Vec<NamedContent>>>,
}

impl MemoryArchive {
    pub fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            root: tempfile::tempdir().unwrap(),
            fail_extract: false,
            fail_pack: false,
            extracted: Mutex::new(Vec::new()),
            packed: Mutex::new(Vec::new()),
        }
    }

    pub fn extracted_dirs(&self) -> Vec<PathBuf> {
        self.extracted.lock().unwrap().clone()
    }

    pub fn packed_bundles(&self) -> Vec<Vec<NamedContent>> {
        self.packed.lock().unwrap().clone()
    }
}

impl ArchivePort for MemoryArchive {
    fn extract<'a>(&'a self, bundle: &'a str) -> ArchiveFuture<'a, WorkDir> {
        Box::pin(async move {
            if self.fail_extract {
                return Err(ArchiveError::Extract(format!("{bundle} is corrupt")));
            }
            let dir = WorkDir::create_in(self.root.path())?;
            for (path, content) in &self.files {
                let target = dir.path().join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, content)?;
            }
            self.extracted
                .lock()
                .unwrap()
                .push(dir.path().to_path_buf());
            Ok(dir)
        })
    }

    fn pack<'a>(&'a self, files: &'a [NamedContent]) -> ArchiveFuture<'a, String> {
        Box::pin(async move {
            if self.fail_pack {
                return Err(ArchiveError::Pack("disk full".to_string()));
            }
            let mut packed = self.packed.lock().unwrap();
            packed.push(files.to_vec());
            Ok(format!("memory://bundle-{}", packed.len()))
        })
    }
}

/// Config with millisecond-scale timeouts.
pub fn fast_config() -> BatchConfig {
    BatchConfig::default()
        .with_max_concurrency(4)
        .with_item_timeout(Duration::from_millis(200))
        .with_batch_deadline(Duration::from_secs(5))
        .with_target_extension("py")
}

pub fn orchestrator(config: BatchConfig) -> (Arc<JobRegistry>, BatchOrchestrator) {
    let registry = Arc::new(JobRegistry::from_config(&config));
    let orchestrator = BatchOrchestrator::new(Arc::clone(&registry), config);
    (registry, orchestrator)
}

pub fn items(count: usize) -> Vec<WorkItem> {
    (1..=count)
        .map(|i| WorkItem::new(format!("file{i}.src"), format!("body {i}")))
        .collect()
}
