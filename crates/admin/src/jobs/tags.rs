//! `tagsAdd` job: tag the products listed by SKU in a CSV file.

use std::collections::HashMap;
use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{Mutation, MutationPayload, RunOptions, payload_errors, run_mutation};
use crate::executor::Executor;
use crate::fetch::ProductSkuEntry;
use crate::input;
use crate::runner::{FieldMapping, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors, queries};

/// Cell value spreadsheets use for "no SKU".
const NO_SKU: &str = "–";

/// `tagsAdd(id, tags)` with a fixed tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsAdd {
    tags: Vec<String>,
}

impl TagsAdd {
    #[must_use]
    pub const fn new(tags: Vec<String>) -> Self {
        Self { tags }
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Single ledger field standing for the whole tag list.
    fn mapping(&self) -> FieldMapping {
        FieldMapping::constant(self.tags.join(","), "tags")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsAddData {
    pub tags_add: Option<MutationPayload>,
}

impl UserErrors for TagsAddData {
    fn user_errors(&self) -> Vec<UserError> {
        payload_errors("tagsAdd", self.tags_add.as_ref())
    }
}

impl Mutation for TagsAdd {
    type Data = TagsAddData;

    fn name(&self) -> &'static str {
        "tagsAdd"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        GraphQLRequest::new(
            queries::TAGS_ADD,
            json!({
                "id": item.resource_key,
                "tags": self.tags,
            }),
        )
    }
}

/// Inputs of a tagging run.
#[derive(Debug, Clone)]
pub struct TagsJob {
    /// CSV listing the products to tag.
    pub csv: PathBuf,
    /// Column of `csv` holding the SKU.
    pub sku_column: String,
    /// `fetch products` export mapping product IDs to their first SKU.
    pub skus: PathBuf,
    pub progress: PathBuf,
    pub mutation: TagsAdd,
    pub options: RunOptions,
}

/// Rows of `csv` with a usable SKU, trimmed, keyed by `column`.
#[must_use]
pub fn sku_rows(rows: Vec<Row>, column: &str) -> Vec<Row> {
    rows.into_iter()
        .filter_map(|row| {
            let sku = row.get(column)?.trim();
            (!sku.is_empty() && sku != NO_SKU)
                .then(|| Row::from([(column.to_string(), sku.to_string())]))
        })
        .collect()
}

/// SKU to product ID, skipping products without a SKU.
#[must_use]
pub fn sku_index(entries: &[ProductSkuEntry]) -> HashMap<String, String> {
    entries
        .iter()
        .filter(|entry| !entry.variant_skus.is_empty())
        .map(|entry| (entry.variant_skus.clone(), entry.id.clone()))
        .collect()
}

impl TagsJob {
    #[must_use]
    pub fn runner_config(&self, remap: HashMap<String, String>) -> RunnerConfig {
        let mut config =
            RunnerConfig::new("tags", Locale::default(), vec![self.mutation.mapping()]);
        config.key_column.clone_from(&self.sku_column);
        config.remap = remap;
        self.options.apply(&mut config);
        config
    }

    /// Read the inputs, report unmatched SKUs, and run.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if an input file cannot be read, the ledger
    /// cannot be written, or a call fails fatally.
    pub async fn run<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
    ) -> Result<Summary, RunnerError> {
        let rows = sku_rows(input::read_csv_rows(&self.csv)?, &self.sku_column);
        let entries: Vec<ProductSkuEntry> = input::read_json(&self.skus)?;
        let index = sku_index(&entries);

        let unmatched: Vec<&str> = rows
            .iter()
            .filter_map(|row| row.get(&self.sku_column))
            .filter(|sku| !index.contains_key(sku.as_str()))
            .map(String::as_str)
            .collect();
        info!(
            skus = rows.len(),
            matched = rows.len() - unmatched.len(),
            unmatched = unmatched.len(),
            tags = ?self.mutation.tags(),
            "Matched CSV SKUs to products"
        );
        if !unmatched.is_empty() {
            warn!(skus = ?unmatched, "Unmatched SKUs");
        }

        let lookup = ResourceLookup::from_keys(index.values().map(ResourceKey::new));
        run_mutation(
            executor,
            &self.mutation,
            self.runner_config(index),
            &rows,
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

    fn row(column: &str, value: &str) -> Row {
        Row::from([(column.to_string(), value.to_string())])
    }

    #[test]
    fn test_sku_rows_skip_blank_and_dash() {
        let rows = vec![
            row("Artikelnummer", " NP-1 "),
            row("Artikelnummer", ""),
            row("Artikelnummer", "–"),
            row("Naam", "no sku column"),
            row("Artikelnummer", "NP-2"),
        ];

        let skus: Vec<_> = sku_rows(rows, "Artikelnummer")
            .into_iter()
            .map(|r| r["Artikelnummer"].clone())
            .collect();
        assert_eq!(skus, vec!["NP-1", "NP-2"]);
    }

    #[test]
    fn test_sku_index_ignores_products_without_sku() {
        let entries = vec![
            ProductSkuEntry {
                id: "gid://shopify/Product/1".into(),
                variant_skus: "NP-1".into(),
            },
            ProductSkuEntry {
                id: "gid://shopify/Product/2".into(),
                variant_skus: String::new(),
            },
        ];

        let index = sku_index(&entries);
        assert_eq!(index.len(), 1);
        assert_eq!(index["NP-1"], "gid://shopify/Product/1");
    }

    #[test]
    fn test_request_uses_tag_list() {
        let mutation = TagsAdd::new(vec!["dropshipment".into(), "sale".into()]);
        let item = WorkItem {
            row: 1,
            resource_key: ResourceKey::new("gid://shopify/Product/1"),
            locale: Locale::default(),
            fields: vec![PayloadField::new(
                FieldKey::new("tags"),
                "dropshipment,sale",
                ContentDigest::default(),
            )],
        };

        let request = mutation.request(&item);
        assert_eq!(
            request.variables,
            json!({"id": "gid://shopify/Product/1", "tags": ["dropshipment", "sale"]})
        );
    }

    #[test]
    fn test_runner_config_keys_on_sku() {
        let job = TagsJob {
            csv: PathBuf::from("tags.csv"),
            sku_column: "Artikelnummer".into(),
            skus: PathBuf::from("skus.json"),
            progress: PathBuf::from("progress.json"),
            mutation: TagsAdd::new(vec!["dropshipment".into()]),
            options: RunOptions::default(),
        };

        let config = job.runner_config(HashMap::from([("NP-1".into(), "P1".into())]));
        assert_eq!(config.key_column, "Artikelnummer");
        assert_eq!(config.remap["NP-1"], "P1");
        assert_eq!(config.mappings, vec![FieldMapping::constant("dropshipment", "tags")]);
    }
}
