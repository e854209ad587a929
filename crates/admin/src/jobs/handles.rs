//! Handle override job: set each product's handle from an export, keeping a
//! redirect from the old handle.

use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{Mutation, ProductUpdateData, RunOptions, run_mutation};
use crate::executor::Executor;
use crate::input;
use crate::runner::{FieldMapping, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, queries};

const ID_COLUMN: &str = "id";
const HANDLE_FIELD: &str = "handle";

/// One `{id, handle}` entry of the handle export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleEntry {
    pub id: String,
    pub handle: String,
}

/// `productUpdate(product: {id, handle, redirectNewHandle: true})`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductHandleUpdate;

impl Mutation for ProductHandleUpdate {
    type Data = ProductUpdateData;

    fn name(&self) -> &'static str {
        "productUpdate"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        GraphQLRequest::new(
            queries::PRODUCT_UPDATE_HANDLE,
            json!({
                "product": {
                    "id": item.resource_key,
                    "handle": item.value_of(HANDLE_FIELD),
                    "redirectNewHandle": true,
                }
            }),
        )
    }
}

/// Inputs of a handle override run.
#[derive(Debug, Clone)]
pub struct HandlesJob {
    /// JSON list of [`HandleEntry`].
    pub handles: PathBuf,
    pub progress: PathBuf,
    pub options: RunOptions,
}

fn handle_rows(entries: &[HandleEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|entry| {
            Row::from([
                (ID_COLUMN.to_string(), entry.id.clone()),
                (HANDLE_FIELD.to_string(), entry.handle.clone()),
            ])
        })
        .collect()
}

impl HandlesJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mapping = FieldMapping::column(HANDLE_FIELD, HANDLE_FIELD)
            .with_fingerprint(FingerprintPolicy::None);
        let mut config = RunnerConfig::new("handles", Locale::default(), vec![mapping]);
        config.key_column = ID_COLUMN.to_string();
        self.options.apply(&mut config);
        config
    }

    /// # Errors
    ///
    /// Returns `RunnerError` if the export cannot be read, the ledger cannot
    /// be written, or a call fails fatally.
    pub async fn run<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
    ) -> Result<Summary, RunnerError> {
        let entries: Vec<HandleEntry> = input::read_json(&self.handles)?;
        info!(products = entries.len(), "Loaded handle overrides");

        let rows = handle_rows(&entries);
        let lookup = ResourceLookup::from_keys(entries.iter().map(|e| ResourceKey::new(&e.id)));
        run_mutation(
            executor,
            &ProductHandleUpdate,
            self.runner_config(),
            &rows,
            &lookup,
            &self.progress,
        )
        .await
    }
}
