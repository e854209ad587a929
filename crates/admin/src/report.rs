//! Offline reports over the job files.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use bulkops_core::Email;
use thiserror::Error;
use tracing::warn;

use crate::fetch::CustomerNode;
use crate::input::{self, InputError};
use crate::ledger::{LedgerError, ProgressLedger};

/// Ledger file name under `<output>/<locale>/`.
pub const LEDGER_FILE: &str = "translated.json";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot list {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

// =============================================================================
// Locale progress
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleProgress {
    pub locale: String,
    /// Rows in the locale's input CSV.
    pub rows: usize,
    /// Distinct resources with at least one successful entry.
    pub translated: usize,
}

impl LocaleProgress {
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent(self.translated, self.rows)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressReport {
    pub locales: Vec<LocaleProgress>,
}

impl ProgressReport {
    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.locales.iter().map(|l| l.rows).sum()
    }

    #[must_use]
    pub fn total_translated(&self) -> usize {
        self.locales.iter().map(|l| l.translated).sum()
    }

    #[must_use]
    pub fn total_percent(&self) -> f64 {
        percent(self.total_translated(), self.total_rows())
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for locale in &self.locales {
            writeln!(
                f,
                "{:<6} {:>6} / {:>6}  ({:>5.1}%)",
                locale.locale,
                locale.translated,
                locale.rows,
                locale.percent()
            )?;
        }
        writeln!(f, "{}", "-".repeat(40))?;
        write!(
            f,
            "{:<6} {:>6} / {:>6}  ({:>5.1}%)",
            "TOTAL",
            self.total_translated(),
            self.total_rows(),
            self.total_percent()
        )
    }
}

/// Compare every `<locale>.csv` in `input_dir` with the ledger at
/// `<output_dir>/<locale>/translated.json`. A missing ledger counts as
/// nothing translated.
///
/// # Errors
///
/// Returns `ReportError` if `input_dir` cannot be listed or a CSV or ledger
/// cannot be read.
pub fn progress_report(input_dir: &Path, output_dir: &Path) -> Result<ProgressReport, ReportError> {
    let read_dir_err = |source| ReportError::ReadDir {
        path: input_dir.to_path_buf(),
        source,
    };

    let mut csvs: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(read_dir_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(read_dir_err)?;
    csvs.retain(|path| path.extension().is_some_and(|ext| ext == "csv"));
    csvs.sort();

    let mut report = ProgressReport::default();
    for csv in csvs {
        let Some(locale) = csv.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let rows = input::read_csv_rows(&csv)?.len();
        let ledger = ProgressLedger::load(output_dir.join(locale).join(LEDGER_FILE))?;

        report.locales.push(LocaleProgress {
            locale: locale.to_string(),
            rows,
            translated: ledger.stats().succeeded_resources,
        });
    }
    Ok(report)
}

// =============================================================================
// Customer domains
// =============================================================================

/// Customers per lowercased `@domain`, most frequent first.
#[must_use]
pub fn domain_counts(customers: &[CustomerNode]) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for customer in customers {
        let Some(raw) = customer.email() else {
            continue;
        };
        match Email::parse(raw) {
            Ok(email) => *counts.entry(email.domain_tag()).or_default() += 1,
            Err(err) => warn!(customer = %customer.id, email = raw, "Skipping email: {err}"),
        }
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|(a_domain, a), (b_domain, b)| b.cmp(a).then_with(|| a_domain.cmp(b_domain)));
    counts
}

/// Write `counts` as an `Email,Count` CSV.
///
/// # Errors
///
/// Returns `ReportError::Input` if the file cannot be written.
pub fn write_domain_csv(path: &Path, counts: &[(String, usize)]) -> Result<(), ReportError> {
    let records = counts
        .iter()
        .map(|(domain, count)| [domain.clone(), count.to_string()]);
    input::write_csv(path, &["Email", "Count"], records)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use bulkops_core::{ContentDigest, FieldKey, Locale, PayloadField, ResourceKey, WorkItem};
    use chrono::Utc;

    use super::*;
    use crate::fetch::EmailAddress;

    fn customer(id: &str, email: Option<&str>) -> CustomerNode {
        CustomerNode {
            id: id.to_string(),
            default_email_address: Some(EmailAddress {
                email_address: email.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_domain_counts() {
        let customers = vec![
            customer("1", Some("a@Kaufland.de")),
            customer("2", Some("b@kaufland.de")),
            customer("3", Some("c@bol.com")),
            customer("4", None),
            customer("5", Some("broken")),
        ];

        assert_eq!(
            domain_counts(&customers),
            vec![("@kaufland.de".to_string(), 2), ("@bol.com".to_string(), 1)]
        );
    }

    #[test]
    fn test_domain_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("domains.csv");
        write_domain_csv(&path, &[("@kaufland.de".to_string(), 2)]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Email,Count\n@kaufland.de,2\n");
    }

    #[test]
    fn test_progress_report() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("de.csv"), "GID,Title\nA,Hallo\nB,Welt\nC,Drei\nD,Vier\n").unwrap();
        std::fs::write(input.join("nl.csv"), "GID,Title\nA,Hallo\n").unwrap();
        std::fs::write(input.join("notes.txt"), "ignored").unwrap();

        let mut ledger = ProgressLedger::load(output.join("de").join(LEDGER_FILE)).unwrap();
        for (id, field) in [("A", "title"), ("A", "body_html"), ("B", "title")] {
            let item = WorkItem {
                row: 1,
                resource_key: ResourceKey::new(id),
                locale: Locale::new("de"),
                fields: vec![PayloadField::new(FieldKey::new(field), "x", ContentDigest::new("d"))],
            };
            ledger.record_success(&item, Utc::now());
        }
        ledger.save().unwrap();

        let report = progress_report(&input, &output).unwrap();

        assert_eq!(
            report.locales,
            vec![
                LocaleProgress { locale: "de".into(), rows: 4, translated: 2 },
                LocaleProgress { locale: "nl".into(), rows: 1, translated: 0 },
            ]
        );
        assert_eq!(report.total_rows(), 5);
        assert!((report.total_percent() - 40.0).abs() < f64::EPSILON);
        assert!(report.to_string().contains("de          2 /      4  ( 50.0%)"));
    }
}
