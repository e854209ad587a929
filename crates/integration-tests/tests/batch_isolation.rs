//! Per-item isolation inside a batch, retries, and fatal aborts.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bulkops_admin::jobs::{Mutation, TranslationsRegister};
use bulkops_admin::shopify::GraphQLRequest;
use bulkops_admin::{
    BatchRunner, Executor, FieldMapping, ProgressLedger, RetryPolicy, Row, RunnerConfig,
    RunnerError,
};
use bulkops_core::{Locale, ProgressStatus, ResourceLookup, TranslatableResource, WorkItem};
use bulkops_integration_tests::{FakeTransport, Reply, resource, row};

const IDS: [&str; 8] = ["A", "B", "C", "D", "E", "F", "G", "H"];

fn config(concurrency: usize) -> RunnerConfig {
    let mut config = RunnerConfig::new(
        "products",
        Locale::new("de"),
        vec![FieldMapping::column("Title", "title")],
    );
    config.concurrency = concurrency;
    config
}

fn fixture(count: usize) -> (Vec<Row>, ResourceLookup) {
    let ids = &IDS[..count];
    let rows = ids
        .iter()
        .copied()
        .map(|id| row(&[("GID", id), ("Title", "Hallo")]))
        .collect();
    let resources: Vec<TranslatableResource> = ids
        .iter()
        .copied()
        .map(|id| resource(id, &[("title", "en", "d1")]))
        .collect();
    (rows, ResourceLookup::new(resources))
}

fn status_of(ledger: &ProgressLedger, id: &str) -> Vec<ProgressStatus> {
    ledger
        .entries()
        .iter()
        .filter(|e| e.resource_key.as_str() == id)
        .map(|e| e.status)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_panicking_item_does_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("translated.json");
    let executor = Executor::new(
        FakeTransport::new().script("C", [Reply::Panic]),
        RetryPolicy::default(),
    );
    let (rows, lookup) = fixture(5);
    let mut ledger = ProgressLedger::load(&path).unwrap();

    let summary = BatchRunner::new(&executor, &TranslationsRegister, config(5))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);

    let ledger = ProgressLedger::load(&path).unwrap();
    assert_eq!(status_of(&ledger, "C"), vec![ProgressStatus::Failed]);
    let error = ledger
        .entries()
        .iter()
        .find(|e| e.resource_key.as_str() == "C")
        .and_then(|e| e.error.clone())
        .unwrap();
    assert!(error.starts_with("panicked: transport exploded"), "{error}");
    for id in ["A", "B", "D", "E"] {
        assert_eq!(status_of(&ledger, id), vec![ProgressStatus::Success], "{id}");
    }
}

/// Registers translations, but panics building the request for one resource.
struct BrokenRequestFor(&'static str);

impl Mutation for BrokenRequestFor {
    type Data = <TranslationsRegister as Mutation>::Data;

    fn name(&self) -> &'static str {
        TranslationsRegister.name()
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        assert_ne!(item.resource_key.as_str(), self.0, "no request for {}", self.0);
        TranslationsRegister.request(item)
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_request_builder_does_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("translated.json");
    let executor = Executor::new(FakeTransport::new(), RetryPolicy::default());
    let (rows, lookup) = fixture(5);
    let mut ledger = ProgressLedger::load(&path).unwrap();

    let summary = BatchRunner::new(&executor, &BrokenRequestFor("C"), config(5))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(executor.transport().calls(), 4);

    let ledger = ProgressLedger::load(&path).unwrap();
    assert_eq!(status_of(&ledger, "C"), vec![ProgressStatus::Failed]);
    let error = ledger
        .entries()
        .iter()
        .find(|e| e.resource_key.as_str() == "C")
        .and_then(|e| e.error.clone())
        .unwrap();
    assert!(error.starts_with("panicked:"), "{error}");
    for id in ["A", "B", "D", "E"] {
        assert_eq!(status_of(&ledger, id), vec![ProgressStatus::Success], "{id}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_commits_batch_then_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("translated.json");
    let executor = Executor::new(
        FakeTransport::new().script("B", [Reply::Unauthorized]),
        RetryPolicy::default(),
    );
    let (rows, lookup) = fixture(8);
    let mut ledger = ProgressLedger::load(&path).unwrap();

    let err = BatchRunner::new(&executor, &TranslationsRegister, config(4))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap_err();

    assert!(matches!(err, RunnerError::Fatal(_)), "{err}");
    assert_eq!(executor.transport().calls(), 4);

    let on_disk = ProgressLedger::load(&path).unwrap();
    assert_eq!(on_disk.stats().success_entries, 3);
    assert!(status_of(&on_disk, "B").is_empty());
    for id in ["E", "F", "G", "H"] {
        assert!(status_of(&on_disk, id).is_empty(), "{id}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_throttled_item_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(
        FakeTransport::new().script("A", [Reply::Throttled, Reply::Throttled]),
        RetryPolicy::default(),
    );
    let (rows, lookup) = fixture(2);
    let mut ledger = ProgressLedger::load(dir.path().join("p.json")).unwrap();

    let started = tokio::time::Instant::now();
    let summary = BatchRunner::new(&executor, &TranslationsRegister, config(2))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(executor.transport().calls(), 4);
    // Two backoffs: at least 1000ms + 2000ms.
    assert!(started.elapsed() >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_exhaustion_fails_only_that_item() {
    let dir = tempfile::tempdir().unwrap();
    let policy = RetryPolicy {
        max_retries: 2,
        ..RetryPolicy::default()
    };
    let executor = Executor::new(
        FakeTransport::new().script("A", [Reply::Throttled, Reply::Throttled, Reply::Throttled]),
        policy,
    );
    let (rows, lookup) = fixture(2);
    let mut ledger = ProgressLedger::load(dir.path().join("p.json")).unwrap();

    let summary = BatchRunner::new(&executor, &TranslationsRegister, config(2))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(executor.transport().calls(), 4);
    assert_eq!(status_of(&ledger, "A"), vec![ProgressStatus::Failed]);
}

#[tokio::test(start_paused = true)]
async fn test_graphql_error_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(
        FakeTransport::new().script("A", [Reply::GraphQLError("Field 'x' doesn't exist".into())]),
        RetryPolicy::default(),
    );
    let (rows, lookup) = fixture(1);
    let mut ledger = ProgressLedger::load(dir.path().join("p.json")).unwrap();

    let summary = BatchRunner::new(&executor, &TranslationsRegister, config(1))
        .run(&rows, &lookup, &mut ledger)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(executor.transport().calls(), 1);
    let error = ledger.entries()[0].error.clone().unwrap();
    assert!(error.contains("Field 'x' doesn't exist"), "{error}");
}
