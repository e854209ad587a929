//! Resuming runs against an existing ledger.
//!
//! Every test runs the batch runner against the fake Admin API, reloads the
//! ledger from disk the way a restarted process would, and runs again.

#![allow(clippy::unwrap_used)]

use std::path::Path;

use bulkops_admin::jobs::TranslationsRegister;
use bulkops_admin::{
    BatchRunner, Executor, FieldMapping, ProgressLedger, RetryPolicy, Row, RunnerConfig, Summary,
};
use bulkops_core::{Locale, ProgressStatus, ResourceLookup, TranslatableResource, ValueHash};
use bulkops_integration_tests::{FakeTransport, Reply, resource, row};
use serde_json::json;

fn config() -> RunnerConfig {
    RunnerConfig::new(
        "products",
        Locale::new("de"),
        vec![FieldMapping::column("Title", "title")],
    )
}

fn resources() -> Vec<TranslatableResource> {
    vec![
        resource("A", &[("title", "en", "d1")]),
        resource("B", &[("title", "en", "d2")]),
        resource("C", &[("title", "en", "d3")]),
    ]
}

fn rows() -> Vec<Row> {
    vec![
        row(&[("GID", "A"), ("Title", "Hallo")]),
        row(&[("GID", "B"), ("Title", "Welt")]),
        row(&[("GID", "C"), ("Title", "Ananas")]),
    ]
}

async fn run_once(
    executor: &Executor<FakeTransport>,
    rows: &[Row],
    resources: Vec<TranslatableResource>,
    ledger_path: &Path,
) -> Summary {
    let mut ledger = ProgressLedger::load(ledger_path).unwrap();
    BatchRunner::new(executor, &TranslationsRegister, config())
        .run(rows, &ResourceLookup::new(resources), &mut ledger)
        .await
        .unwrap()
}

// =============================================================================
// Idempotent resume
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_second_run_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("de").join("translated.json");
    let executor = Executor::new(FakeTransport::new(), RetryPolicy::default());

    let first = run_once(&executor, &rows(), resources(), &ledger_path).await;
    assert_eq!(first.succeeded, 3);
    assert_eq!(executor.transport().calls(), 3);

    let second = run_once(&executor, &rows(), resources(), &ledger_path).await;
    assert_eq!(second.succeeded, 0);
    assert_eq!(second.skipped_done, 3);
    assert_eq!(executor.transport().calls(), 3);

    let ledger = ProgressLedger::load(&ledger_path).unwrap();
    assert_eq!(ledger.entries().len(), 3);
    assert!(ledger.entries().iter().all(|e| e.status == ProgressStatus::Success));
}

#[tokio::test(start_paused = true)]
async fn test_changed_value_or_digest_is_new_work() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("translated.json");
    let executor = Executor::new(FakeTransport::new(), RetryPolicy::default());

    run_once(&executor, &rows(), resources(), &ledger_path).await;

    // B gets a new value, C's source content changed revision.
    let mut edited = rows();
    edited[1].insert("Title".into(), "Welt!".into());
    let mut revised = resources();
    revised[2] = resource("C", &[("title", "en", "d3-v2")]);

    let summary = run_once(&executor, &edited, revised, &ledger_path).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped_done, 1);
    assert_eq!(executor.transport().resources_called()[3..], ["B", "C"]);

    let ledger = ProgressLedger::load(&ledger_path).unwrap();
    assert_eq!(ledger.stats().success_entries, 5);
    assert_eq!(ledger.stats().succeeded_resources, 3);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failure_replaced_then_superseded_by_success() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("translated.json");
    let transport = FakeTransport::new().script(
        "A",
        [
            Reply::UserError("Value is invalid".into()),
            Reply::UserError("Value is still invalid".into()),
        ],
    );
    let executor = Executor::new(transport, RetryPolicy::default());
    let one_row = vec![row(&[("GID", "A"), ("Title", "Hallo")])];

    let first = run_once(&executor, &one_row, resources(), &ledger_path).await;
    assert_eq!(first.failed, 1);

    let second = run_once(&executor, &one_row, resources(), &ledger_path).await;
    assert_eq!(second.failed, 1);

    let ledger = ProgressLedger::load(&ledger_path).unwrap();
    assert_eq!(ledger.entries().len(), 1);
    assert_eq!(
        ledger.entries()[0].error.as_deref(),
        Some("translations: Value is still invalid")
    );

    let third = run_once(&executor, &one_row, resources(), &ledger_path).await;
    assert_eq!(third.succeeded, 1);

    let ledger = ProgressLedger::load(&ledger_path).unwrap();
    assert_eq!(ledger.stats().success_entries, 1);
    assert_eq!(ledger.stats().failed_entries, 1);

    let fourth = run_once(&executor, &one_row, resources(), &ledger_path).await;
    assert_eq!(fourth.skipped_done, 1);
    assert_eq!(executor.transport().calls(), 3);
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_translation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("translated.json");
    let executor = Executor::new(FakeTransport::new(), RetryPolicy::default());

    let summary = run_once(
        &executor,
        &[row(&[("GID", "A"), ("Title", "Hello")])],
        vec![resource("A", &[("title", "en", "d1")])],
        &ledger_path,
    )
    .await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(
        executor.transport().requests(),
        vec![json!({
            "resourceId": "A",
            "translations": [{
                "key": "title",
                "locale": "de",
                "value": "Hello",
                "translatableContentDigest": "d1"
            }]
        })]
    );

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&ledger_path).unwrap()).unwrap();
    let entry = &raw["entries"][0];
    assert_eq!(raw["version"], 1);
    assert_eq!(entry["resourceId"], "A");
    assert_eq!(entry["locale"], "de");
    assert_eq!(entry["key"], "title");
    assert_eq!(entry["digest"], "d1");
    assert_eq!(entry["valueHash"], ValueHash::of("Hello").as_str());
    assert_eq!(entry["status"], "success");
    assert!(entry.get("error").is_none());
}
