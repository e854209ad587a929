//! `bulkops delete customers|orders`.

use std::path::PathBuf;

use bulkops_admin::jobs::{DeleteJob, DeleteTarget};

use super::{CommandError, RunArgs, check_summary, connect};

/// Delete every resource in `input` after the first `skip`.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn run(
    target: DeleteTarget,
    input: PathBuf,
    progress: PathBuf,
    skip: usize,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = DeleteJob {
        target,
        input,
        progress,
        skip,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}
