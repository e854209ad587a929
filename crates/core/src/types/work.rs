//! Work items submitted by the batch runner.

use super::key::{ContentDigest, FieldKey, Locale, ResourceKey, ValueHash};
use super::ledger::IdempotencyKey;

/// One field of a mutation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadField {
    pub key: FieldKey,
    pub value: String,
    /// Revision of the field this value applies to. Empty when the job does
    /// not work with digests.
    pub digest: ContentDigest,
    pub value_hash: ValueHash,
}

impl PayloadField {
    /// Build a field, hashing the value.
    #[must_use]
    pub fn new(key: FieldKey, value: impl Into<String>, digest: ContentDigest) -> Self {
        let value = value.into();
        let value_hash = ValueHash::of(&value);
        Self {
            key,
            value,
            digest,
            value_hash,
        }
    }
}

/// One unit of mutation work derived from an input row.
///
/// Built once by the runner and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// 1-based position of the source row, for log lines.
    pub row: usize,
    pub resource_key: ResourceKey,
    pub locale: Locale,
    pub fields: Vec<PayloadField>,
}

impl WorkItem {
    /// Idempotency key for one of this item's fields.
    #[must_use]
    pub fn key_for(&self, field: &PayloadField) -> IdempotencyKey {
        IdempotencyKey {
            resource_key: self.resource_key.clone(),
            locale: self.locale.clone(),
            field_key: field.key.clone(),
            content_digest: field.digest.clone(),
            value_hash: field.value_hash.clone(),
        }
    }

    /// Comma-separated field keys, for log lines.
    #[must_use]
    pub fn field_list(&self) -> String {
        self.fields
            .iter()
            .map(|field| field.key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Value of the field named `key`, if present.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.key.as_str() == key)
            .map(|field| field.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem {
            row: 1,
            resource_key: ResourceKey::new("A"),
            locale: Locale::new("de"),
            fields: vec![
                PayloadField::new(FieldKey::new("title"), "Hallo", ContentDigest::new("d1")),
                PayloadField::new(FieldKey::new("body_html"), "<p>Hi</p>", ContentDigest::new("d2")),
            ],
        }
    }

    #[test]
    fn test_payload_field_hashes_value() {
        let field = PayloadField::new(FieldKey::new("title"), "Hello", ContentDigest::new("d1"));
        assert_eq!(field.value_hash, ValueHash::of("Hello"));
    }

    #[test]
    fn test_key_for_combines_item_and_field() {
        let item = item();
        let Some(field) = item.fields.first() else {
            panic!("item has fields");
        };
        let key = item.key_for(field);
        assert_eq!(key.resource_key.as_str(), "A");
        assert_eq!(key.locale.as_str(), "de");
        assert_eq!(key.content_digest.as_str(), "d1");
    }

    #[test]
    fn test_field_list_and_value_of() {
        let item = item();
        assert_eq!(item.field_list(), "title, body_html");
        assert_eq!(item.value_of("body_html"), Some("<p>Hi</p>"));
        assert_eq!(item.value_of("handle"), None);
    }
}
