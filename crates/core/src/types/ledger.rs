//! Progress ledger entries.
//!
//! The JSON field names match the progress files the translation scripts
//! have always written, so ledgers from earlier runs load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::{ContentDigest, FieldKey, Locale, ResourceKey, ValueHash};

/// Only ledger format version understood by this crate.
pub const LEDGER_VERSION: u32 = 1;

/// Outcome recorded for one attempted (resource, field) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// The mutation was accepted. Never removed once written.
    Success,
    /// The mutation failed; replaced by the next failure for the same key.
    Failed,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One durable record in the progress ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    #[serde(rename = "resourceId")]
    pub resource_key: ResourceKey,
    pub locale: Locale,
    #[serde(rename = "key")]
    pub field_key: FieldKey,
    #[serde(rename = "digest")]
    pub content_digest: ContentDigest,
    pub value_hash: ValueHash,
    #[serde(rename = "translatedAt")]
    pub timestamp: DateTime<Utc>,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEntry {
    /// The idempotency key this entry was recorded under.
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey {
            resource_key: self.resource_key.clone(),
            locale: self.locale.clone(),
            field_key: self.field_key.clone(),
            content_digest: self.content_digest.clone(),
            value_hash: self.value_hash.clone(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ProgressStatus::Success
    }
}

/// Identity of a unit of work: the same value submitted against the same
/// revision of the same field is the same work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub resource_key: ResourceKey,
    pub locale: Locale,
    pub field_key: FieldKey,
    pub content_digest: ContentDigest,
    pub value_hash: ValueHash,
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.resource_key, self.locale, self.field_key, self.content_digest, self.value_hash
        )
    }
}

/// On-disk ledger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFile {
    pub version: u32,
    pub entries: Vec<ProgressEntry>,
}

impl Default for ProgressFile {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            entries: Vec::new(),
        }
    }
}
