//! Customer and order deletion from a filtered export.

use std::fmt;
use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{Mutation, MutationPayload, RunOptions, payload_errors, run_mutation};
use crate::executor::Executor;
use crate::input;
use crate::runner::{FieldMapping, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors, queries};

const ID_COLUMN: &str = "id";

/// What a delete run removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Customer,
    Order,
}

impl fmt::Display for DeleteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customers"),
            Self::Order => f.write_str("orders"),
        }
    }
}

/// `customerDelete` or `orderDelete`.
#[derive(Debug, Clone, Copy)]
pub struct DeleteMutation(pub DeleteTarget);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteData {
    #[serde(default)]
    pub customer_delete: Option<MutationPayload>,
    #[serde(default)]
    pub order_delete: Option<MutationPayload>,
}

impl UserErrors for DeleteData {
    fn user_errors(&self) -> Vec<UserError> {
        match (&self.customer_delete, &self.order_delete) {
            (Some(payload), _) => payload_errors("customerDelete", Some(payload)),
            (None, Some(payload)) => payload_errors("orderDelete", Some(payload)),
            (None, None) => payload_errors("delete", None),
        }
    }
}

impl Mutation for DeleteMutation {
    type Data = DeleteData;

    fn name(&self) -> &'static str {
        match self.0 {
            DeleteTarget::Customer => "customerDelete",
            DeleteTarget::Order => "orderDelete",
        }
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        match self.0 {
            DeleteTarget::Customer => GraphQLRequest::new(
                queries::CUSTOMER_DELETE,
                json!({ "input": { "id": item.resource_key } }),
            ),
            DeleteTarget::Order => GraphQLRequest::new(
                queries::ORDER_DELETE,
                json!({ "orderId": item.resource_key }),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdNode {
    id: String,
}

/// Inputs of a delete run.
#[derive(Debug, Clone)]
pub struct DeleteJob {
    pub target: DeleteTarget,
    /// Export written by `fetch customers` or `fetch orders`.
    pub input: PathBuf,
    pub progress: PathBuf,
    /// Leading entries of `input` to ignore.
    pub skip: usize,
    pub options: RunOptions,
}

impl DeleteJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::new(
            self.target.to_string(),
            Locale::default(),
            vec![FieldMapping::constant("true", "deleted")],
        );
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
        let nodes: Vec<IdNode> = input::read_json(&self.input)?;
        let total = nodes.len();
        let ids: Vec<String> = nodes.into_iter().skip(self.skip).map(|n| n.id).collect();
        info!(
            target = %self.target,
            loaded = total,
            skipped = total.min(self.skip),
            processing = ids.len(),
            "Loaded delete candidates"
        );

        let rows: Vec<Row> = ids
            .iter()
            .map(|id| Row::from([(ID_COLUMN.to_string(), id.clone())]))
            .collect();
        let lookup = ResourceLookup::from_keys(ids.iter().map(ResourceKey::new));

        run_mutation(
            executor,
            &DeleteMutation(self.target),
            self.runner_config(),
            &rows,
            &lookup,
            &self.progress,
        )
        .await
    }
}
