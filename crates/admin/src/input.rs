//! Reading and writing the job files: CSV rows, JSON exports, remap tables.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::runner::Row;

/// Errors reading or writing an input/output file.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl InputError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read a headed CSV file into rows.
///
/// Rows may be shorter or longer than the header; missing cells are absent
/// from the row and extra cells are dropped.
///
/// # Errors
///
/// Returns `InputError` if the file cannot be opened or parsed.
pub fn read_csv_rows(path: &Path) -> Result<Vec<Row>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| InputError::csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| InputError::csv(path, e))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| InputError::csv(path, e))?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(header, value)| (header.to_string(), value.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// Deserialize a JSON file.
///
/// # Errors
///
/// Returns `InputError` if the file cannot be read or does not match `T`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let text = std::fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| InputError::json(path, e))
}

/// Write pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns `InputError` if the file cannot be written.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), InputError> {
    create_parent(path)?;
    let json = serde_json::to_string_pretty(value).map_err(|e| InputError::json(path, e))?;
    std::fs::write(path, json).map_err(|e| InputError::io(path, e))
}

/// Write a headed CSV file, creating parent directories.
///
/// # Errors
///
/// Returns `InputError` if the file cannot be written.
pub fn write_csv<I, R>(path: &Path, headers: &[&str], records: I) -> Result<(), InputError>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|e| InputError::csv(path, e))?;
    writer
        .write_record(headers)
        .map_err(|e| InputError::csv(path, e))?;
    for record in records {
        writer
            .write_record(record)
            .map_err(|e| InputError::csv(path, e))?;
    }
    writer.flush().map_err(|e| InputError::io(path, e))
}

/// Read a `{ "from": "to" }` resource key remapping table.
///
/// # Errors
///
/// Returns `InputError` if the file cannot be read or is not a string map.
pub fn read_remap(path: &Path) -> Result<HashMap<String, String>, InputError> {
    read_json(path)
}

/// Create the parent directory of `path` if it has one.
///
/// # Errors
///
/// Returns `InputError::Io` if the directory cannot be created.
pub fn create_parent(path: &Path) -> Result<(), InputError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| InputError::io(parent, e))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_rows_flexible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.csv");
        std::fs::write(
            &path,
            "GID,Title,Body\ngid://shopify/Product/1,Hallo,<p>Welt</p>\n\ngid://shopify/Product/2,Nur Titel\n",
        )
        .unwrap();

        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Body"], "<p>Welt</p>");
        assert_eq!(rows[1]["Title"], "Nur Titel");
        assert!(!rows[1].contains_key("Body"));
    }

    #[test]
    fn test_read_csv_quoted_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.csv");
        std::fs::write(&path, "SKU,Name\n\"NP-1\",\"Linen shirt, large\"\n").unwrap();

        let rows = read_csv_rows(&path).unwrap();
        assert_eq!(rows[0]["Name"], "Linen shirt, large");
        assert_eq!(rows[0]["SKU"], "NP-1");
    }

    #[test]
    fn test_write_csv_quotes_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("domains.csv");

        write_csv(&path, &["Email", "Count"], [["@a, b", "2"]]).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Email,Count\n\"@a, b\",2\n");
    }

    #[test]
    fn test_json_round_trip_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("remap.json");
        let map = HashMap::from([("a".to_string(), "b".to_string())]);

        write_json_pretty(&path, &map).unwrap();
        assert_eq!(read_remap(&path).unwrap(), map);
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let err = read_json::<serde_json::Value>(Path::new("/nonexistent/x.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/x.json"));
    }
}
