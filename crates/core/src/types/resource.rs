//! Resource lookup table the batch runner joins input rows against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::key::{ContentDigest, FieldKey, Locale, ResourceKey};

/// Locale whose digest wins when a field has several translatable contents.
pub const CANONICAL_LOCALE: &str = "en";

/// One translatable field of a resource, as exported from the Admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatableContent {
    pub key: FieldKey,
    pub locale: Locale,
    #[serde(default)]
    pub digest: Option<ContentDigest>,
    #[serde(default)]
    pub value: Option<String>,
}

/// A resource together with its translatable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatableResource {
    pub resource_id: ResourceKey,
    #[serde(default)]
    pub translatable_content: Vec<TranslatableContent>,
}

impl TranslatableResource {
    /// A resource with no translatable content. Jobs that only need the
    /// resource to exist (tags, deletes) build their lookup from these.
    #[must_use]
    pub const fn bare(resource_id: ResourceKey) -> Self {
        Self {
            resource_id,
            translatable_content: Vec::new(),
        }
    }

    /// Content digest for `field`, preferring the entry in `canonical`.
    ///
    /// Falls back to the first entry for the field when no canonical entry
    /// exists. Returns `None` when the chosen entry has no digest.
    #[must_use]
    pub fn find_digest(&self, field: &FieldKey, canonical: &Locale) -> Option<&ContentDigest> {
        let mut matches = self
            .translatable_content
            .iter()
            .filter(|content| &content.key == field)
            .peekable();

        let first = *matches.peek()?;
        let best = matches
            .find(|content| &content.locale == canonical)
            .unwrap_or(first);

        best.digest.as_ref().filter(|digest| !digest.is_empty())
    }
}

/// Resources keyed by GID.
#[derive(Debug, Clone, Default)]
pub struct ResourceLookup {
    resources: HashMap<ResourceKey, TranslatableResource>,
}

impl ResourceLookup {
    /// Build a lookup. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(resources: impl IntoIterator<Item = TranslatableResource>) -> Self {
        Self {
            resources: resources
                .into_iter()
                .map(|resource| (resource.resource_id.clone(), resource))
                .collect(),
        }
    }

    /// Build a lookup of bare resources from a list of keys.
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = ResourceKey>) -> Self {
        Self::new(keys.into_iter().map(TranslatableResource::bare))
    }

    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&TranslatableResource> {
        self.resources.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(key: &str, locale: &str, digest: Option<&str>) -> TranslatableContent {
        TranslatableContent {
            key: FieldKey::new(key),
            locale: Locale::new(locale),
            digest: digest.map(ContentDigest::new),
            value: None,
        }
    }

    fn resource(contents: Vec<TranslatableContent>) -> TranslatableResource {
        TranslatableResource {
            resource_id: ResourceKey::new("gid://shopify/Product/1"),
            translatable_content: contents,
        }
    }

    #[test]
    fn test_find_digest_prefers_canonical_locale() {
        let resource = resource(vec![
            content("title", "nl", Some("d-nl")),
            content("title", "en", Some("d-en")),
        ]);
        let digest = resource.find_digest(&FieldKey::new("title"), &Locale::new(CANONICAL_LOCALE));
        assert_eq!(digest.map(ContentDigest::as_str), Some("d-en"));
    }

    #[test]
    fn test_find_digest_falls_back_to_first_match() {
        let resource = resource(vec![
            content("body_html", "en", Some("d-body")),
            content("title", "nl", Some("d-nl")),
            content("title", "de", Some("d-de")),
        ]);
        let digest = resource.find_digest(&FieldKey::new("title"), &Locale::new("en"));
        assert_eq!(digest.map(ContentDigest::as_str), Some("d-nl"));
    }

    #[test]
    fn test_find_digest_missing_field_or_digest() {
        let resource = resource(vec![content("title", "en", None)]);
        assert!(resource.find_digest(&FieldKey::new("title"), &Locale::new("en")).is_none());
        assert!(resource.find_digest(&FieldKey::new("handle"), &Locale::new("en")).is_none());
    }

    #[test]
    fn test_lookup_deserializes_export_shape() {
        let json = r#"[{
            "resourceId": "gid://shopify/Collection/9",
            "translatableContent": [
                {"digest": "abc", "key": "title", "locale": "en", "value": "Summer"}
            ]
        }]"#;
        let resources: Vec<TranslatableResource> =
            serde_json::from_str(json).unwrap_or_default();
        let lookup = ResourceLookup::new(resources);

        assert_eq!(lookup.len(), 1);
        let found = lookup.get(&ResourceKey::new("gid://shopify/Collection/9"));
        assert!(found.is_some());
    }

    #[test]
    fn test_from_keys_builds_bare_resources() {
        let lookup = ResourceLookup::from_keys([ResourceKey::new("a"), ResourceKey::new("b")]);
        assert_eq!(lookup.len(), 2);
        assert!(lookup.get(&ResourceKey::new("a")).is_some_and(|r| r.translatable_content.is_empty()));
    }
}
