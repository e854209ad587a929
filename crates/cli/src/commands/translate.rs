//! `bulkops translate`: run a translation job file.

use std::path::Path;

use bulkops_admin::jobs::TranslationJob;
use tracing::info;

use super::{CommandError, check_summary, connect};

/// Load a job file. Relative paths inside it resolve against its directory.
///
/// # Errors
///
/// Returns `CommandError::JobIo` or `CommandError::Job` if the file cannot
/// be read or parsed.
pub fn load_job(path: &Path) -> Result<TranslationJob, CommandError> {
    let text = std::fs::read_to_string(path).map_err(|source| CommandError::JobIo {
        path: path.to_path_buf(),
        source,
    })?;
    let job: TranslationJob = serde_yaml::from_str(&text).map_err(|source| CommandError::Job {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Ok(job.with_base_dir(base_dir))
}

/// Run every locale of the job in order, or only `locale`.
///
/// # Errors
///
/// Returns `CommandError` if the job is invalid, a locale run aborts, or
/// any item failed.
pub async fn run(
    path: &Path,
    locale: Option<&str>,
    dry_run: bool,
    concurrency: Option<usize>,
) -> Result<(), CommandError> {
    let mut job = load_job(path)?;
    if dry_run {
        job.dry_run = true;
    }
    if let Some(concurrency) = concurrency {
        job.concurrency = concurrency;
    }

    let locales: Vec<String> = match locale {
        Some(locale) if job.locales.iter().any(|l| l == locale) => vec![locale.to_string()],
        Some(locale) => return Err(CommandError::UnknownLocale(locale.to_string())),
        None => job.locales.clone(),
    };

    let executor = connect(job.retry_policy(), job.dry_run).await?;

    let mut failed = 0;
    for locale in &locales {
        info!(label = %job.label, locale = %locale, "Starting locale");
        let summary = job.run_locale(&executor, locale).await?;
        failed += summary.failed;
    }

    info!(label = %job.label, locales = locales.len(), failed, "Translation job finished");
    check_summary(&bulkops_admin::Summary {
        failed,
        ..bulkops_admin::Summary::default()
    })
}
