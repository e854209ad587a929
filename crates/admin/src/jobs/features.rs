//! Feature list job: write each product's bullet-point feature list to a
//! `list.single_line_text_field` metafield.

use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{Mutation, ProductUpdateData, RunOptions, run_mutation};
use crate::executor::Executor;
use crate::input;
use crate::runner::{FieldMapping, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, queries};

const ID_COLUMN: &str = "GID";
const FEATURES_FIELD: &str = "feature_list";
const METAFIELD_TYPE: &str = "list.single_line_text_field";

/// One product of the feature export. `short_description` holds a JSON
/// array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    #[serde(rename = "GID")]
    pub gid: String,
    #[serde(default)]
    pub short_description: String,
}

/// `productUpdate(product: {id, metafields: [{namespace, key, type, value}]})`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureListSet {
    pub namespace: String,
    pub key: String,
}

impl Default for FeatureListSet {
    fn default() -> Self {
        Self {
            namespace: "custom".to_string(),
            key: "feature_list".to_string(),
        }
    }
}

impl Mutation for FeatureListSet {
    type Data = ProductUpdateData;

    fn name(&self) -> &'static str {
        "productUpdate"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        GraphQLRequest::new(
            queries::PRODUCT_UPDATE_METAFIELDS,
            json!({
                "product": {
                    "id": item.resource_key,
                    "metafields": [{
                        "namespace": self.namespace,
                        "key": self.key,
                        "type": METAFIELD_TYPE,
                        "value": item.value_of(FEATURES_FIELD),
                    }],
                }
            }),
        )
    }
}

/// The features in `raw` re-encoded as a compact JSON array, or `None`
/// unless `raw` is a non-empty array of strings.
#[must_use]
pub fn normalize_features(raw: &str) -> Option<String> {
    let features: Vec<String> = serde_json::from_str(raw.trim()).ok()?;
    if features.is_empty() {
        return None;
    }
    serde_json::to_string(&features).ok()
}

/// Rows with the features normalized. Unusable lists become blank and the
/// runner counts them as having nothing to send.
fn feature_rows(entries: &[FeatureEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|entry| {
            let features = normalize_features(&entry.short_description).unwrap_or_else(|| {
                if !entry.short_description.trim().is_empty() {
                    warn!(product = %entry.gid, "Feature list is not a JSON array of strings");
                }
                String::new()
            });
            Row::from([
                (ID_COLUMN.to_string(), entry.gid.clone()),
                (FEATURES_FIELD.to_string(), features),
            ])
        })
        .collect()
}

/// Inputs of a feature list run.
#[derive(Debug, Clone)]
pub struct FeatureListJob {
    /// JSON list of [`FeatureEntry`].
    pub input: PathBuf,
    pub progress: PathBuf,
    pub mutation: FeatureListSet,
    pub options: RunOptions,
}

impl FeatureListJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mapping = FieldMapping::column(FEATURES_FIELD, FEATURES_FIELD)
            .with_fingerprint(FingerprintPolicy::None);
        let mut config = RunnerConfig::new("features", Locale::default(), vec![mapping]);
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
        let entries: Vec<FeatureEntry> = input::read_json(&self.input)?;
        info!(
            products = entries.len(),
            namespace = %self.mutation.namespace,
            key = %self.mutation.key,
            "Loaded feature lists"
        );

        let lookup = ResourceLookup::from_keys(entries.iter().map(|e| ResourceKey::new(&e.gid)));
        run_mutation(
            executor,
            &self.mutation,
            self.runner_config(),
            &feature_rows(&entries),
            &lookup,
            &self.progress,
        )
        .await
    }
}
