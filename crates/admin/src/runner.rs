//! Checkpointed batch runner.
//!
//! A run has two phases:
//!
//! 1. **Build** (no network): each input row is resolved to a resource,
//!    its mapped columns become payload fields, and fields the ledger
//!    already records as successful are dropped. Rows with nothing left to
//!    send are counted as done; rows whose resource is unknown are counted
//!    as missing and never written to the ledger.
//! 2. **Execute**: work items are submitted in batches of `concurrency`.
//!    All items of a batch run concurrently on the runner's task and every
//!    one settles (success, failure, or panic) before the batch outcomes are
//!    folded into the ledger and the ledger is flushed. The runner then
//!    cools down before the next batch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use bulkops_core::{
    CANONICAL_LOCALE, ContentDigest, FieldKey, IdempotencyKey, Locale, PayloadField, ResourceKey,
    ResourceLookup, ThrottleReading, TranslatableResource, WorkItem,
};
use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::executor::{CallFailure, Executor};
use crate::input::InputError;
use crate::jobs::Mutation;
use crate::ledger::{LedgerError, ProgressLedger};
use crate::shopify::{AdminShopifyError, GraphQLTransport};

/// One input row, keyed by column header.
pub type Row = HashMap<String, String>;

/// Errors that stop a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Input(#[from] InputError),

    /// A fatal error (credentials) from one of the calls. The batch that
    /// hit it has been committed and flushed.
    #[error("run aborted: {0}")]
    Fatal(#[source] AdminShopifyError),
}

/// Where a payload field's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// The named column of the input row.
    Column(String),
    /// The same value for every row.
    Constant(String),
}

/// Whether a field needs a content digest from the resource lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintPolicy {
    /// Skip the field when the resource has no digest for it.
    Required,
    /// No digest; the resource only has to exist.
    None,
}

/// Maps one value source onto one payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: FieldSource,
    pub field: FieldKey,
    pub fingerprint: FingerprintPolicy,
}

impl FieldMapping {
    /// A column whose value needs a content digest.
    #[must_use]
    pub fn column(column: impl Into<String>, field: impl Into<FieldKey>) -> Self {
        Self {
            source: FieldSource::Column(column.into()),
            field: field.into(),
            fingerprint: FingerprintPolicy::Required,
        }
    }

    /// A constant value with no content digest.
    #[must_use]
    pub fn constant(value: impl Into<String>, field: impl Into<FieldKey>) -> Self {
        Self {
            source: FieldSource::Constant(value.into()),
            field: field.into(),
            fingerprint: FingerprintPolicy::None,
        }
    }

    #[must_use]
    pub const fn with_fingerprint(mut self, fingerprint: FingerprintPolicy) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    fn value<'r>(&'r self, row: &'r Row) -> Option<&'r str> {
        match &self.source {
            FieldSource::Column(column) => row.get(column).map(String::as_str),
            FieldSource::Constant(value) => Some(value.as_str()),
        }
    }
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Name used in log lines.
    pub label: String,
    /// Locale (or variant tag) recorded in the ledger. Empty for jobs that
    /// are not per-locale.
    pub locale: Locale,
    /// Column holding the resource key.
    pub key_column: String,
    pub mappings: Vec<FieldMapping>,
    /// Rewrites resource keys before lookup (e.g. source GID to target GID).
    pub remap: HashMap<String, String>,
    /// Locale whose digest wins when a field has several.
    pub canonical_locale: Locale,
    pub dry_run: bool,
    /// Items per batch.
    pub concurrency: usize,
    /// Pause between batches when nothing was throttled.
    pub batch_delay: Duration,
    /// Minimum pause after a batch that observed throttling.
    pub throttle_cooldown: Duration,
    /// Restore rate assumed when a draining reading reports none.
    pub fallback_restore_rate: f64,
}

impl RunnerConfig {
    #[must_use]
    pub fn new(label: impl Into<String>, locale: Locale, mappings: Vec<FieldMapping>) -> Self {
        Self {
            label: label.into(),
            locale,
            key_column: "GID".to_string(),
            mappings,
            remap: HashMap::new(),
            canonical_locale: Locale::new(CANONICAL_LOCALE),
            dry_run: false,
            concurrency: 4,
            batch_delay: Duration::from_millis(20),
            throttle_cooldown: Duration::from_millis(2000),
            fallback_restore_rate: 50.0,
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_rows: usize,
    pub succeeded: usize,
    pub skipped_done: usize,
    pub skipped_missing: usize,
    pub failed: usize,
    /// Items a dry run would have sent.
    pub planned: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<18}{:>8}", "Total rows", self.total_rows)?;
        writeln!(f, "{:<18}{:>8}", "Succeeded", self.succeeded)?;
        writeln!(f, "{:<18}{:>8}", "Skipped (done)", self.skipped_done)?;
        writeln!(f, "{:<18}{:>8}", "Skipped (missing)", self.skipped_missing)?;
        write!(f, "{:<18}{:>8}", "Failed", self.failed)?;
        if self.planned > 0 {
            write!(f, "\n{:<18}{:>8}", "Planned (dry run)", self.planned)?;
        }
        Ok(())
    }
}

/// Output of the build phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildPlan {
    pub items: Vec<WorkItem>,
    pub skipped_done: usize,
    pub skipped_missing: usize,
}

/// Runs one mutation over a set of rows.
pub struct BatchRunner<'a, C, M> {
    executor: &'a Executor<C>,
    mutation: &'a M,
    config: RunnerConfig,
}

impl<'a, C: GraphQLTransport, M: Mutation> BatchRunner<'a, C, M> {
    #[must_use]
    pub const fn new(executor: &'a Executor<C>, mutation: &'a M, config: RunnerConfig) -> Self {
        Self {
            executor,
            mutation,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Build phase: turn rows into work items. Touches neither the network
    /// nor the ledger file.
    #[must_use]
    pub fn plan(&self, rows: &[Row], lookup: &ResourceLookup, ledger: &ProgressLedger) -> BuildPlan {
        let mut plan = BuildPlan::default();
        let mut queued: HashSet<IdempotencyKey> = HashSet::new();
        let total = rows.len();

        for (index, row) in rows.iter().enumerate() {
            let position = index + 1;
            let raw_key = row
                .get(&self.config.key_column)
                .map(|key| key.trim())
                .unwrap_or_default();
            if raw_key.is_empty() {
                warn!("[{position}/{total}] skipped (no {})", self.config.key_column);
                plan.skipped_missing += 1;
                continue;
            }

            let resource_key = ResourceKey::new(
                self.config
                    .remap
                    .get(raw_key)
                    .map_or(raw_key, String::as_str),
            );
            let Some(resource) = lookup.get(&resource_key) else {
                info!("[{position}/{total}] {resource_key} skipped (no matching resource)");
                plan.skipped_missing += 1;
                continue;
            };

            let item = self.build_item(position, total, row, resource, ledger, &mut queued);
            if item.fields.is_empty() {
                debug!("[{position}/{total}] {resource_key} skipped (already done or nothing to send)");
                plan.skipped_done += 1;
                continue;
            }
            plan.items.push(item);
        }

        plan
    }

    fn build_item(
        &self,
        position: usize,
        total: usize,
        row: &Row,
        resource: &TranslatableResource,
        ledger: &ProgressLedger,
        queued: &mut HashSet<IdempotencyKey>,
    ) -> WorkItem {
        let mut item = WorkItem {
            row: position,
            resource_key: resource.resource_id.clone(),
            locale: self.config.locale.clone(),
            fields: Vec::with_capacity(self.config.mappings.len()),
        };

        for mapping in &self.config.mappings {
            let Some(value) = mapping.value(row).filter(|v| !v.trim().is_empty()) else {
                continue;
            };

            let digest = match mapping.fingerprint {
                FingerprintPolicy::None => ContentDigest::default(),
                FingerprintPolicy::Required => {
                    let Some(digest) =
                        resource.find_digest(&mapping.field, &self.config.canonical_locale)
                    else {
                        info!(
                            "[{position}/{total}] {} skipped key \"{}\" (no digest)",
                            resource.resource_id, mapping.field
                        );
                        continue;
                    };
                    digest.clone()
                }
            };

            let field = PayloadField::new(mapping.field.clone(), value, digest);
            let key = item.key_for(&field);
            // A repeated row counts as done once its first occurrence is queued.
            if ledger.is_done(&key) || !queued.insert(key) {
                continue;
            }
            item.fields.push(field);
        }

        item
    }

    /// Build and execute, committing each batch to `ledger`.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Ledger` if the ledger cannot be saved and
    /// `RunnerError::Fatal` when a call fails with a fatal error. In both
    /// cases every batch before the failing one is already on disk.
    pub async fn run(
        &self,
        rows: &[Row],
        lookup: &ResourceLookup,
        ledger: &mut ProgressLedger,
    ) -> Result<Summary, RunnerError> {
        let label = &self.config.label;
        info!(
            label = %label,
            locale = %self.config.locale,
            rows = rows.len(),
            resources = lookup.len(),
            already_done = ledger.success_count(),
            dry_run = self.config.dry_run,
            "Starting {}", self.mutation.name()
        );

        let plan = self.plan(rows, lookup, ledger);
        let mut summary = Summary {
            total_rows: rows.len(),
            skipped_done: plan.skipped_done,
            skipped_missing: plan.skipped_missing,
            ..Summary::default()
        };

        if self.config.dry_run {
            for item in &plan.items {
                info!(
                    "[{}/{}] {} DRY RUN: would send {} field(s): {}",
                    item.row,
                    rows.len(),
                    item.resource_key,
                    item.fields.len(),
                    item.field_list()
                );
            }
            summary.planned = plan.items.len();
            return Ok(summary);
        }

        let total = plan.items.len();
        let concurrency = self.config.concurrency.max(1);
        let batch_count = total.div_ceil(concurrency);

        for (batch_index, batch) in plan.items.chunks(concurrency).enumerate() {
            // Building the request happens inside the guard so a panic there
            // settles only its own item.
            let calls = batch.iter().map(|item| {
                AssertUnwindSafe(async move {
                    let request = self.mutation.request(item);
                    self.executor
                        .execute::<M::Data>(item.resource_key.as_str(), &request)
                        .await
                })
                .catch_unwind()
            });
            let settled = join_all(calls).await;

            let now = Utc::now();
            let mut fatal: Option<AdminShopifyError> = None;
            let mut throttled = false;
            let mut lowest: Option<ThrottleReading> = None;

            for (offset, (item, result)) in batch.iter().zip(settled).enumerate() {
                let position = batch_index * concurrency + offset + 1;
                let failure = match result {
                    Ok(Ok(outcome)) => {
                        throttled |= outcome.throttled;
                        if let Some(reading) = outcome.throttle {
                            debug!(resource = %item.resource_key, "Throttle: {reading}");
                            if lowest.is_none_or(|low| reading.currently_available < low.currently_available) {
                                lowest = Some(reading);
                            }
                        }
                        outcome.result.err()
                    }
                    Ok(Err(err)) => {
                        error!("[{position}/{total}] FATAL {}: {err}", item.resource_key);
                        fatal.get_or_insert(err);
                        continue;
                    }
                    Err(panic) => Some(CallFailure::Panicked(panic_message(panic.as_ref()))),
                };

                match failure {
                    None => {
                        info!("[{position}/{total}] OK {}", item.resource_key);
                        ledger.record_success(item, now);
                        summary.succeeded += 1;
                    }
                    Some(failure) => {
                        let message = failure.to_string();
                        warn!("[{position}/{total}] FAIL {}: {message}", item.resource_key);
                        ledger.record_failure(item, &message, now);
                        summary.failed += 1;
                    }
                }
            }

            ledger.save()?;

            if let Some(err) = fatal {
                return Err(RunnerError::Fatal(err));
            }

            if batch_index + 1 < batch_count {
                let pause = self.cooldown(throttled, lowest);
                if throttled || pause > self.config.batch_delay {
                    info!(pause_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX), "Throttle low, backing off");
                }
                tokio::time::sleep(pause).await;
            }
        }

        info!(label = %label, "{} finished\n{summary}", self.mutation.name());
        Ok(summary)
    }

    /// Pause after a batch.
    ///
    /// A draining bucket (less than two seconds of restore left) waits until
    /// it would be back at two seconds, computed from the lowest reading.
    /// The pause is never shorter than `batch_delay`, and any throttling
    /// observed by the executor raises it to at least `throttle_cooldown`.
    #[must_use]
    pub fn cooldown(&self, throttled: bool, lowest: Option<ThrottleReading>) -> Duration {
        let dynamic = lowest.and_then(|reading| {
            let rate = if reading.restore_rate > 0.0 {
                reading.restore_rate
            } else {
                self.config.fallback_restore_rate
            };
            let reading = ThrottleReading {
                restore_rate: rate,
                ..reading
            };
            if !reading.is_draining() {
                return None;
            }
            let millis = ((rate * 2.0 - reading.currently_available) / rate * 1000.0)
                .ceil()
                .max(0.0);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped non-negative
            let millis = millis as u64;
            Some(Duration::from_millis(millis))
        });

        match (dynamic, throttled) {
            (Some(pause), true) => pause.max(self.config.throttle_cooldown),
            (Some(pause), false) => pause.max(self.config.batch_delay),
            (None, true) => self.config.throttle_cooldown,
            (None, false) => self.config.batch_delay,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
