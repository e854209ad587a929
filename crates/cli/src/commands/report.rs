//! `bulkops report domains` and `bulkops progress`.

use std::path::Path;

use bulkops_admin::fetch::CustomerNode;
use bulkops_admin::{input, report};
use tracing::info;

use super::CommandError;

/// Count the customers of a `fetch customers` export per email domain.
///
/// # Errors
///
/// Returns `CommandError` if the export cannot be read or the CSV written.
pub fn domains(customers_path: &Path, out: &Path) -> Result<(), CommandError> {
    let customers: Vec<CustomerNode> = input::read_json(customers_path)?;
    let counts = report::domain_counts(&customers);
    report::write_domain_csv(out, &counts)?;

    info!(customers = customers.len(), domains = counts.len(), out = %out.display(), "Wrote domain report");
    Ok(())
}

/// Print the per-locale completion table.
///
/// # Errors
///
/// Returns `CommandError` if the input directory or a ledger cannot be read.
#[allow(clippy::print_stdout)]
pub fn progress(input_dir: &Path, output_dir: &Path) -> Result<(), CommandError> {
    let report = report::progress_report(input_dir, output_dir)?;
    println!("{report}");
    Ok(())
}
