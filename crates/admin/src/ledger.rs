//! Durable progress ledger.
//!
//! One JSON document per job (`{version, entries}`), loaded once and
//! rewritten in full after every batch. A `success` entry is never removed;
//! a new failure replaces earlier failures recorded under the same
//! idempotency key.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bulkops_core::{
    IdempotencyKey, LEDGER_VERSION, ProgressEntry, ProgressFile, ProgressStatus, ResourceKey,
    WorkItem,
};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

/// Errors reading or writing a ledger file.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed ledger {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported ledger version {found} in {path} (expected {LEDGER_VERSION})")]
    UnsupportedVersion { path: PathBuf, found: u32 },
}

/// Counts derived from the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Distinct resources with at least one success.
    pub succeeded_resources: usize,
    pub success_entries: usize,
    pub failed_entries: usize,
}

/// A ledger file and its in-memory index.
#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    file: ProgressFile,
    succeeded: HashSet<IdempotencyKey>,
}

impl ProgressLedger {
    /// Load the ledger at `path`, or start an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError` if the file cannot be read, is not valid JSON,
    /// or has an unsupported version.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let file: ProgressFile =
                    serde_json::from_str(&text).map_err(|source| LedgerError::Json {
                        path: path.clone(),
                        source,
                    })?;
                if file.version != LEDGER_VERSION {
                    return Err(LedgerError::UnsupportedVersion {
                        path,
                        found: file.version,
                    });
                }
                file
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => ProgressFile::default(),
            Err(source) => return Err(LedgerError::Io { path, source }),
        };

        let succeeded = file
            .entries
            .iter()
            .filter(|entry| entry.is_success())
            .map(ProgressEntry::idempotency_key)
            .collect();

        Ok(Self {
            path,
            file,
            succeeded,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn entries(&self) -> &[ProgressEntry] {
        &self.file.entries
    }

    /// Whether `key` has a `success` entry.
    #[must_use]
    pub fn is_done(&self, key: &IdempotencyKey) -> bool {
        self.succeeded.contains(key)
    }

    /// Number of distinct successful idempotency keys.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Append one `success` entry per field of `item`.
    ///
    /// Fields already recorded as successful are left alone.
    pub fn record_success(&mut self, item: &WorkItem, at: DateTime<Utc>) {
        for field in &item.fields {
            let key = item.key_for(field);
            if !self.succeeded.insert(key.clone()) {
                continue;
            }
            self.file.entries.push(entry(key, ProgressStatus::Success, None, at));
        }
    }

    /// Replace earlier failures for each field of `item` with a fresh one.
    ///
    /// Fields already recorded as successful keep their `success` entry and
    /// get no failure beside it.
    pub fn record_failure(&mut self, item: &WorkItem, error: &str, at: DateTime<Utc>) {
        for field in &item.fields {
            let key = item.key_for(field);
            if self.succeeded.contains(&key) {
                continue;
            }
            self.file.entries.retain(|existing| {
                existing.is_success() || existing.idempotency_key() != key
            });
            self.file.entries.push(entry(
                key,
                ProgressStatus::Failed,
                Some(error.to_string()),
                at,
            ));
        }
    }

    /// Rewrite the ledger file.
    ///
    /// Writes to a sibling temp file, flushes it to disk and renames it into
    /// place, then syncs the directory so the rename itself survives a
    /// crash. A crash at any point leaves either the previous ledger or the
    /// new one.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Io` if the directory or file cannot be written.
    pub fn save(&self) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(io_err)?;

        let json = serde_json::to_string_pretty(&self.file).map_err(|source| LedgerError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        {
            let mut file = File::create(&tmp).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        sync_dir(parent).map_err(io_err)?;

        debug!(path = %self.path.display(), entries = self.file.entries.len(), "Ledger saved");
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> LedgerStats {
        let succeeded_resources: HashSet<&ResourceKey> = self
            .file
            .entries
            .iter()
            .filter(|e| e.is_success())
            .map(|e| &e.resource_key)
            .collect();
        let success_entries = self.file.entries.iter().filter(|e| e.is_success()).count();

        LedgerStats {
            succeeded_resources: succeeded_resources.len(),
            success_entries,
            failed_entries: self.file.entries.len() - success_entries,
        }
    }
}

fn entry(
    key: IdempotencyKey,
    status: ProgressStatus,
    error: Option<String>,
    at: DateTime<Utc>,
) -> ProgressEntry {
    ProgressEntry {
        resource_key: key.resource_key,
        locale: key.locale,
        field_key: key.field_key,
        content_digest: key.content_digest,
        value_hash: key.value_hash,
        timestamp: at,
        status,
        error,
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened for syncing on this platform.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
