//! Collection override job: reset each collection's title, handle and
//! description from the English export, keeping a redirect from the old
//! handle.

use std::path::PathBuf;

use bulkops_core::{Locale, ResourceKey, ResourceLookup, WorkItem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;

use super::{Mutation, MutationPayload, RunOptions, payload_errors, run_mutation};
use crate::executor::Executor;
use crate::input;
use crate::runner::{FieldMapping, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors, queries};

const ID_COLUMN: &str = "id";

/// Ledger field key to `CollectionInput` field.
const FIELDS: [(&str, &str); 3] = [
    ("title", "title"),
    ("handle", "handle"),
    ("body_html", "descriptionHtml"),
];

/// One collection of the English export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub handle: String,
    /// Plain text; blank lines separate paragraphs.
    #[serde(default)]
    pub description: String,
}

/// `collectionUpdate(input: {id, title, handle, descriptionHtml, redirectNewHandle})`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionOverride;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdateData {
    pub collection_update: Option<MutationPayload>,
}

impl UserErrors for CollectionUpdateData {
    fn user_errors(&self) -> Vec<UserError> {
        payload_errors("collectionUpdate", self.collection_update.as_ref())
    }
}

impl Mutation for CollectionOverride {
    type Data = CollectionUpdateData;

    fn name(&self) -> &'static str {
        "collectionUpdate"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        let mut input = Map::new();
        input.insert("id".to_string(), json!(item.resource_key));
        for (field, input_field) in FIELDS {
            if let Some(value) = item.value_of(field) {
                input.insert(input_field.to_string(), Value::from(value));
            }
        }
        if input.contains_key("handle") {
            input.insert("redirectNewHandle".to_string(), Value::Bool(true));
        }

        GraphQLRequest::new(queries::COLLECTION_UPDATE, json!({ "input": input }))
    }
}

/// Plain text to HTML: blank-line separated paragraphs, single newlines as
/// `<br>`.
#[must_use]
pub fn description_to_html(description: &str) -> String {
    description
        .trim()
        .split("\n\n")
        .map(|block| format!("<p>{}</p>", block.trim_matches('\n').replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn collection_rows(entries: &[CollectionEntry]) -> Vec<Row> {
    entries
        .iter()
        .map(|entry| {
            let html = if entry.description.trim().is_empty() {
                String::new()
            } else {
                description_to_html(&entry.description)
            };
            Row::from([
                (ID_COLUMN.to_string(), entry.id.clone()),
                ("title".to_string(), entry.title.clone()),
                ("handle".to_string(), entry.handle.clone()),
                ("body_html".to_string(), html),
            ])
        })
        .collect()
}

/// Inputs of a collection override run.
#[derive(Debug, Clone)]
pub struct CollectionsJob {
    /// JSON list of [`CollectionEntry`].
    pub input: PathBuf,
    pub progress: PathBuf,
    pub options: RunOptions,
}

impl CollectionsJob {
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        let mappings = FIELDS
            .iter()
            .map(|(field, _)| FieldMapping::column(*field, *field).with_fingerprint(FingerprintPolicy::None))
            .collect();
        let mut config = RunnerConfig::new("collections", Locale::default(), mappings);
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
        let entries: Vec<CollectionEntry> = input::read_json(&self.input)?;
        info!(collections = entries.len(), "Loaded collection overrides");

        let lookup = ResourceLookup::from_keys(entries.iter().map(|e| ResourceKey::new(&e.id)));
        run_mutation(
            executor,
            &CollectionOverride,
            self.runner_config(),
            &collection_rows(&entries),
            &lookup,
            &self.progress,
        )
        .await
    }
}
