//! Command implementations.
//!
//! Every command that talks to the Admin API builds its client the same way
//! through [`connect`]: credentials from the environment, one
//! [`AdminClient`] and one [`Executor`] shared by every call of the run.

pub mod collections;
pub mod delete;
pub mod fetch;
pub mod handles;
pub mod products;
pub mod report;
pub mod tag;
pub mod translate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bulkops_admin::auth::{
    AuthError, OAuthRefresher, PgSessionStore, SessionTokenProvider, StaticTokenProvider,
    TokenProvider,
};
use bulkops_admin::config::{BulkOpsConfig, ConfigError, CredentialsConfig, ErrorKeywordsConfig};
use bulkops_admin::fetch::{FetchError, PageOptions};
use bulkops_admin::input::InputError;
use bulkops_admin::jobs::RunOptions;
use bulkops_admin::report::ReportError;
use bulkops_admin::{AdminClient, AdminShopifyError, ApiLink, Executor, RetryPolicy, RunnerError};
use thiserror::Error;
use tracing::info;

/// Errors surfaced by the commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Shopify(#[from] AdminShopifyError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("cannot read job file {path}: {source}")]
    JobIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job file {path}: {source}")]
    Job {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("locale {0} is not listed in the job file")]
    UnknownLocale(String),

    #[error("{failed} item(s) failed")]
    ItemsFailed { failed: usize },
}

/// Batch knobs shared by the mutation commands.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Plan without sending mutations or writing the ledger
    #[arg(long)]
    pub dry_run: bool,

    /// Items per batch
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Pause between batches, in milliseconds
    #[arg(long, default_value_t = 20)]
    pub batch_delay_ms: u64,

    /// Retries per item for throttle and transient errors
    #[arg(long, default_value_t = 6)]
    pub max_retries: u32,
}

impl RunArgs {
    #[must_use]
    pub const fn options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            concurrency: self.concurrency,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        retry_policy(self.max_retries)
    }
}

/// Knobs shared by the export commands.
#[derive(Debug, Clone, clap::Args)]
pub struct FetchArgs {
    /// JSON file to write
    #[arg(long)]
    pub out: PathBuf,

    /// Pause between pages, in milliseconds
    #[arg(long, default_value_t = 5)]
    pub page_delay_ms: u64,

    /// Retries per page for throttle and transient errors
    #[arg(long, default_value_t = 6)]
    pub max_retries: u32,
}

impl FetchArgs {
    #[must_use]
    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            page_delay: Duration::from_millis(self.page_delay_ms),
            ..PageOptions::default()
        }
    }
}

fn retry_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        ..RetryPolicy::default()
    }
}

/// Build the token provider, client and executor from the environment.
///
/// A dry run gets an offline executor and reads no configuration.
///
/// # Errors
///
/// Returns `CommandError` if the configuration is incomplete, the session
/// database is unreachable, or the HTTP client cannot be built.
pub async fn connect(policy: RetryPolicy, dry_run: bool) -> Result<Executor<ApiLink>, CommandError> {
    if dry_run {
        info!("Dry run, not connecting to the Admin API");
        return Ok(Executor::new(ApiLink::Offline, policy));
    }

    let config = BulkOpsConfig::from_env()?;

    let tokens: Arc<dyn TokenProvider> = match config.credentials {
        CredentialsConfig::StaticToken(token) => {
            info!(shop = %config.shopify.shop, "Using static access token");
            Arc::new(StaticTokenProvider::new(token))
        }
        CredentialsConfig::SessionDatabase {
            database_url,
            client_id,
            client_secret,
        } => {
            info!(shop = %config.shopify.shop, "Using offline session from the session database");
            let store = PgSessionStore::connect(&database_url).await?;
            let refresher = OAuthRefresher::new(reqwest::Client::new(), client_id, client_secret);
            Arc::new(SessionTokenProvider::new(store, refresher))
        }
    };

    if config.error_keywords != ErrorKeywordsConfig::default() {
        info!(
            throttle = ?config.error_keywords.throttle,
            transient = ?config.error_keywords.transient,
            "Using extra error keywords"
        );
    }

    let client = AdminClient::new(&config.shopify, tokens)?;
    Ok(Executor::new(ApiLink::Live(client), policy).with_error_keywords(&config.error_keywords))
}

/// Turn a finished run into the command result: any failed item makes the
/// command exit non-zero once the summary has been logged.
fn check_summary(summary: &bulkops_admin::Summary) -> Result<(), CommandError> {
    if summary.failed > 0 {
        return Err(CommandError::ItemsFailed {
            failed: summary.failed,
        });
    }
    Ok(())
}
