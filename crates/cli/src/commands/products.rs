//! `bulkops products ...`: SEO, feature list and video jobs.

use std::path::PathBuf;

use bulkops_admin::jobs::{
    FeatureListJob, FeatureListSet, MediaAddJob, MediaReorderJob, ProductMediaReorder, SeoJob,
};

use super::{CommandError, RunArgs, check_summary, connect};

/// Set search titles and descriptions from an export.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn seo(input: PathBuf, progress: PathBuf, run: &RunArgs) -> Result<(), CommandError> {
    let job = SeoJob {
        input,
        progress,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}

/// Write feature lists to the `namespace.key` metafield.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn features(
    input: PathBuf,
    progress: PathBuf,
    mutation: FeatureListSet,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = FeatureListJob {
        input,
        progress,
        mutation,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}

/// Attach one external video per product.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn add_videos(input: PathBuf, progress: PathBuf, run: &RunArgs) -> Result<(), CommandError> {
    let job = MediaAddJob {
        input,
        progress,
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}

/// Move each product's first external video to `position`.
///
/// # Errors
///
/// Returns `CommandError` if the run aborts or any item failed.
pub async fn reorder_videos(
    input: PathBuf,
    progress: PathBuf,
    position: usize,
    run: &RunArgs,
) -> Result<(), CommandError> {
    let job = MediaReorderJob {
        input,
        progress,
        mutation: ProductMediaReorder { position },
        options: run.options(),
    };

    let executor = connect(run.retry_policy(), run.dry_run).await?;
    let summary = job.run(&executor).await?;
    check_summary(&summary)
}
