//! SEO metadata job: set each product's search title and description from
//! an English export.

use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

use super::{Mutation, ProductUpdateData, RunOptions, run_mutation};
use crate::executor::Executor;
use crate::input;
use crate::runner::{FieldMapping, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, queries};

const ID_COLUMN: &str = "GID";
const TITLE_FIELD: &str = "seo_title";
const DESCRIPTION_FIELD: &str = "seo_description";

/// One product of the SEO export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoEntry {
    #[serde(rename = "GID")]
    pub gid: String,
    #[serde(default)]
    pub metatitle: String,
    #[serde(default)]
    pub metadescription: String,
}

/// `productUpdate(product: {id, seo: {title, description}})`.
///
/// Only the fields the item carries are sent, so a field already recorded
/// as done is left untouched on the product.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductSeoUpdate;

impl Mutation for ProductSeoUpdate {
    type Data = ProductUpdateData;

    fn name(&self) -> &'static str {
        "productUpdate"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        let mut seo = Map::new();
        if let Some(title) = item.value_of(TITLE_FIELD) {
            seo.insert("title".to_string(), Value::from(title));
        }
        if let Some(description) = item.value_of(DESCRIPTION_FIELD) {
            seo.insert("description".to_string(), Value::from(description));
        }

        GraphQLRequest::new(
            queries::PRODUCT_UPDATE_SEO,
            json!({
                "product": {
                    "id": item.resource_key,
                    "seo": seo,
                }
            }),
        )
    }
}

fn seo_rows(entries: &[SeoEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|entry| {
            Row::from([
                (ID_COLUMN.to_string(), entry.gid.clone()),
                (TITLE_FIELD.to_string(), entry.metatitle.clone()),
                (DESCRIPTION_FIELD.to_string(), entry.metadescription.clone()),
            ])
        })
        .collect()
}

/// Inputs of an SEO run.
#[derive(Debug, Clone)]
pub struct SeoJob {
    /// JSON list of [`SeoEntry`].
    pub input: PathBuf,
    pub progress: PathBuf,
    pub options: RunOptions,
}

impl SeoJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mappings = [TITLE_FIELD, DESCRIPTION_FIELD]
            .into_iter()
            .map(|field| FieldMapping::column(field, field).with_fingerprint(FingerprintPolicy::None))
            .collect();
        let mut config = RunnerConfig::new("seo", Locale::default(), mappings);
        config.key_column = ID_COLUMN.to_string();
        self.options.apply(&mut config);
        config
    }

    /// Products with neither a title nor a description are counted as
    /// having nothing to send.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if the export cannot be read, the ledger cannot
    /// be written, or a call fails fatally.
    pub async fn run<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
    ) -> Result<Summary, RunnerError> {
        let entries: Vec<SeoEntry> = input::read_json(&self.input)?;
        info!(products = entries.len(), "Loaded SEO metadata");

        let lookup = ResourceLookup::from_keys(entries.iter().map(|e| ResourceKey::new(&e.gid)));
        run_mutation(
            executor,
            &ProductSeoUpdate,
            self.runner_config(),
            &seo_rows(&entries),
            &lookup,
            &self.progress,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bulkops_core::{ContentDigest, FieldKey, PayloadField};

    use super::*;

    fn item(fields: &[(&str, &str)]) -> WorkItem {
        WorkItem {
            row: 1,
            resource_key: ResourceKey::new("gid://shopify/Product/3"),
            locale: Locale::default(),
            fields: fields
                .iter()
                .map(|(key, value)| PayloadField::new(FieldKey::new(*key), *value, ContentDigest::default()))
                .collect(),
        }
    }

    #[test]
    fn test_request_sends_both_fields() {
        let request = ProductSeoUpdate.request(&item(&[
            ("seo_title", "Linen Shirt | Summer"),
            ("seo_description", "Breathable linen."),
        ]));
        assert_eq!(
            request.variables,
            json!({
                "product": {
                    "id": "gid://shopify/Product/3",
                    "seo": {"title": "Linen Shirt | Summer", "description": "Breathable linen."}
                }
            })
        );
    }

    #[test]
    fn test_request_omits_missing_field() {
        let request = ProductSeoUpdate.request(&item(&[("seo_description", "Breathable linen.")]));
        assert_eq!(
            request.variables["product"]["seo"],
            json!({"description": "Breathable linen."})
        );
    }

    #[test]
    fn test_entries_deserialize_with_missing_fields() {
        let entries: Vec<SeoEntry> = serde_json::from_value(json!([
            {"GID": "gid://shopify/Product/1", "metatitle": "Shirt"},
            {"GID": "gid://shopify/Product/2", "metatitle": "", "metadescription": ""}
        ]))
        .unwrap();
        let rows = seo_rows(&entries);
        assert_eq!(rows[0]["seo_title"], "Shirt");
        assert_eq!(rows[0]["seo_description"], "");
        assert_eq!(rows[1]["GID"], "gid://shopify/Product/2");
    }
}
