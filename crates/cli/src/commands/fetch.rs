//! `bulkops fetch ...`: paginated exports written as pretty JSON.

use bulkops_admin::fetch;
use bulkops_admin::input;
use bulkops_core::DomainBlocklist;
use tracing::info;

use super::{CommandError, FetchArgs, connect, retry_policy};

/// The requested fragments, or the marketplace list when none were given.
fn blocklist(domains: &[String]) -> DomainBlocklist {
    if domains.is_empty() {
        DomainBlocklist::marketplaces()
    } else {
        DomainBlocklist::new(domains)
    }
}

/// # Errors
///
/// Returns `CommandError` if a page fails or the export cannot be written.
pub async fn translatable(
    resource_type: &str,
    keys: &[String],
    args: &FetchArgs,
) -> Result<(), CommandError> {
    let executor = connect(retry_policy(args.max_retries), false).await?;
    let resources =
        fetch::fetch_translatable_resources(&executor, resource_type, keys, args.page_options())
            .await?;

    input::write_json_pretty(&args.out, &resources)?;
    info!(resource_type, count = resources.len(), out = %args.out.display(), "Wrote translatable resources");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError` if a page fails or the export cannot be written.
pub async fn customers(domains: &[String], args: &FetchArgs) -> Result<(), CommandError> {
    let executor = connect(retry_policy(args.max_retries), false).await?;
    let customers = fetch::fetch_customers(&executor, &blocklist(domains), args.page_options()).await?;

    input::write_json_pretty(&args.out, &customers)?;
    info!(count = customers.len(), out = %args.out.display(), "Wrote filtered customers");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError` if a page fails or the export cannot be written.
pub async fn orders(domains: &[String], args: &FetchArgs) -> Result<(), CommandError> {
    let executor = connect(retry_policy(args.max_retries), false).await?;
    let orders = fetch::fetch_orders(&executor, &blocklist(domains), args.page_options()).await?;

    input::write_json_pretty(&args.out, &orders)?;
    info!(count = orders.len(), out = %args.out.display(), "Wrote filtered orders");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError` if a page fails or the export cannot be written.
pub async fn products(args: &FetchArgs) -> Result<(), CommandError> {
    let executor = connect(retry_policy(args.max_retries), false).await?;
    let products = fetch::fetch_products(&executor, args.page_options()).await?;

    input::write_json_pretty(&args.out, &products)?;
    info!(count = products.len(), out = %args.out.display(), "Wrote product SKUs");
    Ok(())
}

/// # Errors
///
/// Returns `CommandError` if a page fails or the export cannot be written.
pub async fn media(args: &FetchArgs) -> Result<(), CommandError> {
    let executor = connect(retry_policy(args.max_retries), false).await?;
    let products = fetch::fetch_product_media(&executor, args.page_options()).await?;

    input::write_json_pretty(&args.out, &products)?;
    info!(count = products.len(), out = %args.out.display(), "Wrote product media");
    Ok(())
}
