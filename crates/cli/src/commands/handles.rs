//! `bulkops handles override`.

use std::path::PathBuf;

use bulkops_admin::jobs::HandlesJob;

use super::{CommandError, RunArgs, check_summary, connect};

/// Set every product's handle from `input`, redirecting the old handle.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn override_handles(
    input: PathBuf,
    progress: PathBuf,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = HandlesJob {
        handles: input,
        progress,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}
