//! `bulkops tag products`.

use std::path::PathBuf;

use bulkops_admin::jobs::{TagsAdd, TagsJob};

use super::{CommandError, RunArgs, check_summary, connect};

/// Add `tags` to every product whose SKU appears in `csv`.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn products(
    csv: PathBuf,
    sku_column: String,
    skus: PathBuf,
    tags: Vec<String>,
    progress: PathBuf,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = TagsJob {
        csv,
        sku_column,
        skus,
        progress,
        mutation: TagsAdd::new(tags),
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}
