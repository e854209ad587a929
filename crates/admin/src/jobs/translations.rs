//! `translationsRegister` jobs.
//!
//! A translation job reads one CSV per locale (one row per resource, one
//! column per translated field), joins it against a `fetch translatable`
//! export for the content digests, and registers the translations.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use bulkops_core::{Locale, ResourceLookup, TranslatableResource, WorkItem};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{Mutation, MutationPayload, payload_errors, run_mutation};
use crate::executor::{Executor, RetryPolicy};
use crate::input::{self, InputError};
use crate::runner::{FieldMapping, Row, RunnerConfig, RunnerError, Summary};
use crate::shopify::{GraphQLRequest, GraphQLTransport, UserError, UserErrors, queries};

/// Placeholder replaced by the locale in job file paths.
pub const LOCALE_PLACEHOLDER: &str = "{locale}";

/// `translationsRegister(resourceId, translations)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationsRegister;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationsRegisterData {
    pub translations_register: Option<MutationPayload>,
}

impl UserErrors for TranslationsRegisterData {
    fn user_errors(&self) -> Vec<UserError> {
        payload_errors("translationsRegister", self.translations_register.as_ref())
    }
}

impl Mutation for TranslationsRegister {
    type Data = TranslationsRegisterData;

    fn name(&self) -> &'static str {
        "translationsRegister"
    }

    fn request(&self, item: &WorkItem) -> GraphQLRequest {
        let translations: Vec<_> = item
            .fields
            .iter()
            .map(|field| {
                json!({
                    "key": field.key,
                    "locale": item.locale,
                    "value": field.value,
                    "translatableContentDigest": field.digest,
                })
            })
            .collect();

        GraphQLRequest::new(
            queries::TRANSLATIONS_REGISTER,
            json!({
                "resourceId": item.resource_key,
                "translations": translations,
            }),
        )
    }
}

/// One CSV column mapped onto a translatable field key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnMapping {
    pub column: String,
    pub key: String,
}

/// A translation job file.
///
/// ```yaml
/// label: Products
/// locales: [de, nl]
/// input: input/{locale}.csv
/// resources: data/product-translatable-resources.json
/// progress: output/{locale}/translated.json
/// mappings:
///   - { column: Title, key: title }
///   - { column: Description, key: body_html }
/// ```
///
/// Relative paths resolve against [`TranslationJob::base_dir`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslationJob {
    pub label: String,
    pub locales: Vec<String>,
    /// CSV path template.
    pub input: String,
    /// Translatable resources export path template.
    pub resources: String,
    /// Ledger path template.
    pub progress: String,
    #[serde(default = "default_key_column")]
    pub key_column: String,
    /// Optional JSON `{ "csv key": "resource key" }` table.
    #[serde(default)]
    pub remap: Option<String>,
    pub mappings: Vec<ColumnMapping>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_canonical_locale")]
    pub canonical_locale: String,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_key_column() -> String {
    "GID".to_string()
}

const fn default_concurrency() -> usize {
    4
}

const fn default_batch_delay_ms() -> u64 {
    20
}

const fn default_max_retries() -> u32 {
    6
}

fn default_canonical_locale() -> String {
    bulkops_core::CANONICAL_LOCALE.to_string()
}

impl TranslationJob {
    /// Resolve relative paths against `dir` (usually the job file's directory).
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Substitute `locale` into a path template and resolve it.
    #[must_use]
    pub fn path_for(&self, template: &str, locale: &str) -> PathBuf {
        let path = PathBuf::from(template.replace(LOCALE_PLACEHOLDER, locale));
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            ..RetryPolicy::default()
        }
    }

    /// Runner configuration for one locale.
    #[must_use]
    pub fn runner_config(&self, locale: &str, remap: HashMap<String, String>) -> RunnerConfig {
        let mappings = self
            .mappings
            .iter()
            .map(|m| FieldMapping::column(m.column.clone(), m.key.as_str()))
            .collect();

        let mut config = RunnerConfig::new(self.label.clone(), Locale::new(locale), mappings);
        config.key_column.clone_from(&self.key_column);
        config.remap = remap;
        config.canonical_locale = Locale::new(self.canonical_locale.clone());
        config.dry_run = self.dry_run;
        config.concurrency = self.concurrency;
        config.batch_delay = Duration::from_millis(self.batch_delay_ms);
        config
    }

    fn load_inputs(
        &self,
        locale: &str,
    ) -> Result<(Vec<Row>, ResourceLookup, HashMap<String, String>), InputError> {
        let rows = input::read_csv_rows(&self.path_for(&self.input, locale))?;
        let resources: Vec<TranslatableResource> =
            input::read_json(&self.path_for(&self.resources, locale))?;
        let remap = match &self.remap {
            Some(path) => input::read_remap(&self.path_for(path, locale))?,
            None => HashMap::new(),
        };

        info!(
            locale,
            rows = rows.len(),
            resources = resources.len(),
            remapped = remap.len(),
            "Loaded translation inputs"
        );
        Ok((rows, ResourceLookup::new(resources), remap))
    }

    /// Run the job for one locale.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError` if an input file cannot be read, the ledger
    /// cannot be written, or a call fails fatally.
    pub async fn run_locale<C: GraphQLTransport>(
        &self,
        executor: &Executor<C>,
        locale: &str,
    ) -> Result<Summary, RunnerError> {
        let (rows, lookup, remap) = self.load_inputs(locale)?;
        let progress = self.path_for(&self.progress, locale);
        run_mutation(
            executor,
            &TranslationsRegister,
            self.runner_config(locale, remap),
            &rows,
            &lookup,
            &progress,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bulkops_core::{ContentDigest, FieldKey, PayloadField, ResourceKey};

    use super::*;

    fn job() -> TranslationJob {
        serde_json::from_value(json!({
            "label": "Products",
            "locales": ["de", "nl"],
            "input": "input/{locale}.csv",
            "resources": "/data/resources.json",
            "progress": "output/{locale}/translated.json",
            "mappings": [{"column": "Title", "key": "title"}],
        }))
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let item = WorkItem {
            row: 1,
            resource_key: ResourceKey::new("gid://shopify/Product/1"),
            locale: Locale::new("de"),
            fields: vec![PayloadField::new(
                FieldKey::new("title"),
                "Hallo",
                ContentDigest::new("d1"),
            )],
        };

        let request = TranslationsRegister.request(&item);

        assert_eq!(request.query, queries::TRANSLATIONS_REGISTER);
        assert_eq!(
            request.variables,
            json!({
                "resourceId": "gid://shopify/Product/1",
                "translations": [{
                    "key": "title",
                    "locale": "de",
                    "value": "Hallo",
                    "translatableContentDigest": "d1"
                }]
            })
        );
    }

    #[test]
    fn test_user_errors_from_payload() {
        let data: TranslationsRegisterData = serde_json::from_value(json!({
            "translationsRegister": {
                "translations": null,
                "userErrors": [{"code": "INVALID_VALUE_FOR_HANDLE_TRANSLATION", "field": ["translations"], "message": "Handle is invalid"}]
            }
        }))
        .unwrap();
        let errors = data.user_errors();
        assert_eq!(errors[0].to_string(), "INVALID_VALUE_FOR_HANDLE_TRANSLATION: Handle is invalid");
    }

    #[test]
    fn test_job_defaults_and_paths() {
        let job = job().with_base_dir("/jobs/products");

        assert_eq!(job.key_column, "GID");
        assert_eq!(job.concurrency, 4);
        assert_eq!(job.max_retries, 6);
        assert_eq!(job.path_for(&job.input, "de"), PathBuf::from("/jobs/products/input/de.csv"));
        assert_eq!(job.path_for(&job.resources, "de"), PathBuf::from("/data/resources.json"));
        assert_eq!(
            job.path_for(&job.progress, "pt-pt"),
            PathBuf::from("/jobs/products/output/pt-pt/translated.json")
        );
    }

    #[test]
    fn test_runner_config_from_job() {
        let config = job().runner_config("nl", HashMap::new());
        assert_eq!(config.locale.as_str(), "nl");
        assert_eq!(config.mappings, vec![FieldMapping::column("Title", "title")]);
        assert_eq!(config.batch_delay, Duration::from_millis(20));
        assert_eq!(config.canonical_locale.as_str(), "en");
    }

    #[test]
    fn test_unknown_job_field_rejected() {
        let result: Result<TranslationJob, _> = serde_json::from_value(json!({
            "label": "x", "locales": [], "input": "", "resources": "", "progress": "",
            "mappings": [], "sleep": 5
        }));
        assert!(result.is_err());
    }
}
