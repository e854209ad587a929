//! `bulkops collections override`.

use std::path::PathBuf;

use bulkops_admin::jobs::CollectionsJob;

use super::{CommandError, RunArgs, check_summary, connect};

/// Reset titles, handles and descriptions from the English export.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn override_collections(
    input: PathBuf,
    progress: PathBuf,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = CollectionsJob {
        input,
        progress,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}
