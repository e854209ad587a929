//! Mutation payload shapes for the batch runner.
//!
//! Each job is a [`Mutation`] plus a function that turns its input files into
//! rows, a resource lookup, and a [`RunnerConfig`]. The runner does the rest.
//!
//! | Job                | Mutation                          | Fingerprint |
//! |--------------------|-----------------------------------|-------------|
//! | [`translations`]   | `translationsRegister`            | digest      |
//! | [`tags`]           | `tagsAdd`                         | none        |
//! | [`handles`]        | `productUpdate` (handle)          | none        |
//! | [`seo`]            | `productUpdate` (seo)             | none        |
//! | [`features`]       | `productUpdate` (metafield)       | none        |
//! | [`media`]          | `productUpdate` (media) / `productReorderMedia` | none |
//! | [`collections`]    | `collectionUpdate`                | none        |
//! | [`deletes`]        | `customerDelete` / `orderDelete`  | none        |
//!
//! [`RunnerConfig`]: crate::runner::RunnerConfig

pub mod collections;
pub mod deletes;
pub mod features;
pub mod handles;
pub mod media;
pub mod seo;
pub mod tags;
pub mod translations;

use std::path::Path;
use std::time::Duration;

use bulkops_core::{ResourceLookup, WorkItem};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::executor::Executor;
use crate::ledger::ProgressLedger;
use crate::runner::{BatchRunner, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors};

pub use collections::{CollectionEntry, CollectionOverride, CollectionsJob};
pub use deletes::{DeleteJob, DeleteMutation, DeleteTarget};
pub use features::{FeatureEntry, FeatureListJob, FeatureListSet};
pub use handles::{HandleEntry, HandlesJob, ProductHandleUpdate};
pub use media::{MediaAddJob, MediaReorderJob, ProductMediaAdd, ProductMediaReorder};
pub use seo::{ProductSeoUpdate, SeoEntry, SeoJob};
pub use tags::{TagsAdd, TagsJob};
pub use translations::{ColumnMapping, TranslationJob, TranslationsRegister};

/// A GraphQL mutation the runner can submit for a work item.
pub trait Mutation: Send + Sync {
    /// Shape of `data` in the response.
    type Data: DeserializeOwned + UserErrors + Send;

    /// Mutation name, for log lines.
    fn name(&self) -> &'static str;

    /// Build the request for one item.
    fn request(&self, item: &WorkItem) -> GraphQLRequest;
}

/// The `userErrors` list every mutation payload carries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationPayload {
    /// Media mutations name the list `mediaUserErrors`.
    #[serde(default, alias = "mediaUserErrors")]
    pub user_errors: Vec<UserError>,
}

/// `data` of every `productUpdate` variant.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdateData {
    pub product_update: Option<MutationPayload>,
}

impl UserErrors for ProductUpdateData {
    fn user_errors(&self) -> Vec<UserError> {
        payload_errors("productUpdate", self.product_update.as_ref())
    }
}

/// User errors of an optional payload; a `null` payload is itself an error.
fn payload_errors(mutation: &str, payload: Option<&MutationPayload>) -> Vec<UserError> {
    payload.map_or_else(
        || {
            vec![UserError {
                field: None,
                message: format!("{mutation} returned no payload"),
                code: None,
            }]
        },
        |payload| payload.user_errors.clone(),
    )
}

/// Run knobs shared by the jobs that take them from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub concurrency: usize,
    pub batch_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: 4,
            batch_delay: Duration::from_millis(20),
        }
    }
}

impl RunOptions {
    fn apply(self, config: &mut RunnerConfig) {
        config.dry_run = self.dry_run;
        config.concurrency = self.concurrency;
        config.batch_delay = self.batch_delay;
    }
}

/// Load the ledger at `progress` and run `mutation` over `rows`.
///
/// # Errors
///
/// Returns `RunnerError` if the ledger cannot be loaded or saved, or a call
/// fails fatally.
pub async fn run_mutation<C, M>(
    executor: &Executor<C>,
    mutation: &M,
    config: RunnerConfig,
    rows: &[Row],
    lookup: &ResourceLookup,
    progress: &Path,
) -> Result<Summary, RunnerError>
where
    C: GraphQLTransport,
    M: Mutation,
{
    let mut ledger = ProgressLedger::load(progress)?;
    BatchRunner::new(executor, mutation, config)
        .run(rows, lookup, &mut ledger)
        .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_media_user_errors_alias() {
        let payload: MutationPayload = serde_json::from_value(serde_json::json!({
            "job": null,
            "mediaUserErrors": [{"field": ["moves"], "message": "Media does not exist"}]
        }))
        .unwrap();
        assert_eq!(payload.user_errors.len(), 1);
        assert_eq!(payload.user_errors[0].message, "Media does not exist");
    }

    #[test]
    fn test_null_payload_is_an_error() {
        let errors = payload_errors("tagsAdd", None);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "tagsAdd returned no payload");

        let empty = MutationPayload::default();
        assert!(payload_errors("tagsAdd", Some(&empty)).is_empty());
    }
}
