#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use actors::{BatchOrchestrator, JobRegistry, STEP_CONVERT};
use batch_core::{ArchivePort, BatchError, ConversionPort, JobEvent, JobStatus};
use common::{Behavior, MemoryArchive, ScriptedConverter, fast_config, orchestrator};

const FILES: &[(&str, &str)] = &[
    ("file10.sas", "data ten;"),
    ("file2.sas", "data two;"),
    ("File1.sas", "data one;"),
    ("nested/file3.sas", "data three;"),
    ("nested/file4.sas", "data four;"),
];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_batch_completes_with_sorted_results() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let archive = MemoryArchive::new(FILES);
    let converter = Arc::new(
        ScriptedConverter::new(Behavior::Succeed)
            .with("file2.sas", Behavior::Fail("unsupported macro"))
            .with("nested/file4.sas", Behavior::Fail("unsupported macro")),
    );

    let (job_id, result) = orchestrator
        .run("uploads/batch-1", converter.clone(), &archive)
        .await?;

    assert_eq!(result.total_files, 5);
    assert_eq!(result.processed_files, 3);
    assert_eq!(result.failed_files, 2);
    assert_eq!(result.success_rate, 60);
    assert_eq!(result.bundle.as_deref(), Some("memory://bundle-1"));
    assert_eq!(result.packaging_error, None);

    let order: Vec<&str> = result.results.iter().map(|r| r.original.as_str()).collect();
    assert_eq!(
        order,
        vec![
            "File1.sas",
            "file2.sas",
            "file10.sas",
            "nested/file3.sas",
            "nested/file4.sas"
        ]
    );

    let packed = archive.packed_bundles();
    assert_eq!(packed.len(), 1);
    let names: Vec<&str> = packed[0].iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["File1.py", "file10.py", "nested/file3.py"]);
    assert_eq!(packed[0][0].content, "DATA ONE;");

    let job = registry.get(job_id)?;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.overall_progress(), 100.0);
    assert_eq!(job.result.as_ref(), Some(&result));
    assert!(job.completed_at.is_some());

    for dir in archive.extracted_dirs() {
        assert!(!dir.exists(), "work dir {dir:?} was left behind");
    }
    Ok(())
}

#[tokio::test]
async fn extension_filter_limits_discovery() -> Result<(), Box<dyn Error>> {
    let config = fast_config().with_include_extensions(["sas"]);
    let (_registry, orchestrator) = orchestrator(config);
    let archive = MemoryArchive::new(&[
        ("a.sas", "x"),
        ("README.md", "docs"),
        ("notes", "no extension"),
    ]);
    let converter = Arc::new(ScriptedConverter::new(Behavior::Succeed));

    let (_, result) = orchestrator.run("b", converter.clone(), &archive).await?;

    assert_eq!(result.total_files, 1);
    assert_eq!(result.results[0].original, "a.sas");
    assert_eq!(converter.stats.total_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn extraction_failure_fails_the_job() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let mut archive = MemoryArchive::new(FILES);
    archive.fail_extract = true;
    let converter = Arc::new(ScriptedConverter::new(Behavior::Succeed));
    let mut events = registry.broadcaster().subscribe_all();

    let outcome = orchestrator.run("broken.zip", converter.clone(), &archive).await;
    assert!(matches!(outcome, Err(BatchError::Extraction(_))));
    assert_eq!(converter.stats.total_calls(), 0);

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    let last = last.expect("a final event");
    assert!(matches!(last, JobEvent::JobFailed { .. }));

    let job = registry.get(last.job_id())?;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap_or_default().contains("broken.zip is corrupt"));
    assert!(job.result.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn batch_deadline_fails_the_job_and_cleans_up() -> Result<(), Box<dyn Error>> {
    let config = fast_config()
        .with_max_concurrency(1)
        .with_item_timeout(Duration::from_millis(500))
        .with_batch_deadline(Duration::from_millis(800));
    let (registry, orchestrator) = orchestrator(config);
    let archive = MemoryArchive::new(&[
        ("a1.sas", "1"),
        ("a2.sas", "2"),
        ("a3.sas", "3"),
        ("a4.sas", "4"),
        ("a5.sas", "5"),
    ]);
    let converter = Arc::new(ScriptedConverter::new(Behavior::Delay(Duration::from_millis(
        300,
    ))));
    let mut events = registry.broadcaster().subscribe_all();

    let outcome = orchestrator.run("slow", converter, &archive).await;
    let Err(error) = outcome else {
        panic!("expected the batch to time out");
    };
    assert!(error.is_timeout());

    let jobs = registry.list();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap_or_default().contains("timed out"));
    assert!(job.result.is_none());
    assert!(job.completed_at.is_none());

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        saw_completed |= matches!(event, JobEvent::JobCompleted { .. });
    }
    assert!(!saw_completed);

    for dir in archive.extracted_dirs() {
        assert!(!dir.exists());
    }
    Ok(())
}

#[tokio::test]
async fn packaging_failure_keeps_the_results() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let mut archive = MemoryArchive::new(FILES);
    archive.fail_pack = true;
    let converter = Arc::new(ScriptedConverter::new(Behavior::Succeed));

    let (job_id, result) = orchestrator.run("b", converter, &archive).await?;

    assert_eq!(result.processed_files, 5);
    assert_eq!(result.bundle, None);
    assert_eq!(
        result.packaging_error.as_deref(),
        Some("packing failed: disk full")
    );
    assert_eq!(registry.get(job_id)?.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn empty_bundle_completes_without_packing() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let archive = MemoryArchive::new(&[]);
    let converter = Arc::new(ScriptedConverter::new(Behavior::Hang));

    let (job_id, result) = orchestrator.run("empty", converter.clone(), &archive).await?;

    assert_eq!(result.total_files, 0);
    assert_eq!(result.processed_files, 0);
    assert_eq!(result.success_rate, 0);
    assert!(archive.packed_bundles().is_empty());
    assert_eq!(converter.stats.total_calls(), 0);
    assert_eq!(registry.get(job_id)?.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn events_track_progress_monotonically() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let archive = MemoryArchive::new(FILES);
    let converter = Arc::new(
        ScriptedConverter::new(Behavior::Delay(Duration::from_millis(10)))
            .with("file2.sas", Behavior::Fail("x")),
    );
    let mut all = registry.broadcaster().subscribe_all();

    let (job_id, _) = orchestrator.run("b", converter, &archive).await?;

    let mut events = Vec::new();
    while let Ok(event) = all.try_recv() {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.job_id() == job_id));
    assert!(matches!(events.first(), Some(JobEvent::JobCreated { .. })));
    assert!(matches!(events.last(), Some(JobEvent::JobCompleted { .. })));
    assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);

    let progress: Vec<f64> = events.iter().map(|e| e.job().overall_progress()).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    // One convert-step update per item, between setup and teardown.
    let per_item = events
        .iter()
        .filter(|e| {
            e.job()
                .current_step
                .as_deref()
                .is_some_and(|s| s.starts_with("converted "))
        })
        .count();
    assert_eq!(per_item, FILES.len());
    let last_item = events
        .iter()
        .rev()
        .find(|e| e.job().current_step.as_deref() == Some("converted 5/5 files"))
        .expect("final item event");
    assert_eq!(last_item.job().steps()[STEP_CONVERT].progress, 90);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_batch_can_be_polled() -> Result<(), Box<dyn Error>> {
    let config = fast_config();
    let registry = Arc::new(JobRegistry::from_config(&config));
    let orchestrator = Arc::new(BatchOrchestrator::new(Arc::clone(&registry), config));
    let archive: Arc<dyn ArchivePort> = Arc::new(MemoryArchive::new(FILES));
    let converter: Arc<dyn ConversionPort> = Arc::new(ScriptedConverter::new(Behavior::Delay(
        Duration::from_millis(20),
    )));

    let job_id = orchestrator.spawn("b", converter, archive)?;
    assert!(registry.get(job_id).is_ok());
    let mut addressed = registry.broadcaster().subscribe_job(job_id);

    let job = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let job = registry.get(job_id).unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.map(|r| r.total_files), Some(FILES.len()));

    let mut last = None;
    while let Ok(event) = addressed.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(JobEvent::JobCompleted { .. })));
    Ok(())
}

#[tokio::test]
async fn concurrent_batches_are_tracked_separately() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let first = MemoryArchive::new(&[("a.sas", "a")]);
    let second = MemoryArchive::new(&[("b.sas", "b"), ("c.sas", "c")]);
    let converter: Arc<dyn ConversionPort> = Arc::new(ScriptedConverter::new(Behavior::Succeed));

    let (one, two) = tokio::join!(
        orchestrator.run("one", Arc::clone(&converter), &first),
        orchestrator.run("two", Arc::clone(&converter), &second),
    );
    let (id_one, result_one) = one?;
    let (id_two, result_two) = two?;

    assert_ne!(id_one, id_two);
    assert_eq!(result_one.total_files, 1);
    assert_eq!(result_two.total_files, 2);
    assert_eq!(registry.len(), 2);
    Ok(())
}

#[tokio::test]
async fn classifier_panic_fails_only_that_file() -> Result<(), Box<dyn Error>> {
    let (registry, orchestrator) = orchestrator(fast_config());
    let archive = MemoryArchive::new(&[("a.sas", "ok"), ("b.sas", "bad"), ("c.sas", "ok")]);
    let converter = Arc::new(ScriptedConverter::new(Behavior::Succeed).with_unclassifiable("bad"));

    let (job_id, result) = orchestrator.run("b", converter.clone(), &archive).await?;

    assert_eq!(result.total_files, 3);
    assert_eq!(result.processed_files, 2);
    assert_eq!(result.failed_files, 1);
    let failed: Vec<&str> = result
        .results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.original.as_str())
        .collect();
    assert_eq!(failed, vec!["b.sas"]);
    assert!(
        result.results[1]
            .error
            .as_deref()
            .unwrap_or_default()
            .starts_with("converter panicked: cannot classify")
    );
    assert_eq!(converter.stats.calls_for("b.sas"), 0);

    assert_eq!(registry.get(job_id)?.status, JobStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn same_stem_sources_pack_distinct_artifacts() -> Result<(), Box<dyn Error>> {
    let (_registry, orchestrator) = orchestrator(fast_config());
    let archive = MemoryArchive::new(&[
        ("etl/load.sas", "data x;"),
        ("etl/load.sql", "select 1;"),
        ("etl/main.sas", "run;"),
    ]);
    let converter = Arc::new(ScriptedConverter::new(Behavior::Succeed));

    let (_, result) = orchestrator.run("b", converter, &archive).await?;
    assert_eq!(result.processed_files, 3);

    let packed = archive.packed_bundles();
    assert_eq!(packed.len(), 1);
    let artifacts: Vec<(&str, &str)> = packed[0]
        .iter()
        .map(|a| (a.name.as_str(), a.content.as_str()))
        .collect();
    assert_eq!(
        artifacts,
        vec![
            ("etl/load_sas.py", "DATA X;"),
            ("etl/load_sql.py", "SELECT 1;"),
            ("etl/main.py", "RUN;"),
        ]
    );
    Ok(())
}
