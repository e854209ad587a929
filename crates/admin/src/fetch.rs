//! Paginated exports: translatable resources, customers, orders, products,
//! product media.
//!
//! Every page goes through the [`Executor`], so throttle and transient
//! retries behave exactly as they do for mutations. A page that still fails
//! after retries aborts the export; a partial export is never written.

use std::collections::HashSet;
use std::time::Duration;

use bulkops_core::{DomainBlocklist, FieldKey, TranslatableResource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, instrument};

use crate::executor::{CallFailure, Executor};
use crate::shopify::{AdminShopifyError, Connection, GraphQLRequest, GraphQLTransport, queries};

/// Largest page the Admin API serves.
pub const PAGE_SIZE: u32 = 250;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Shopify(#[from] AdminShopifyError),

    #[error("{root} page {page} failed: {failure}")]
    Page {
        root: &'static str,
        page: usize,
        #[source]
        failure: CallFailure,
    },

    #[error("{root} page {page} is missing the connection: {source}")]
    Shape {
        root: &'static str,
        page: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Paging knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub page_size: u32,
    /// Pause between pages.
    pub page_delay: Duration,
    /// Pause after a page that observed throttling.
    pub throttle_pause: Duration,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            page_delay: Duration::from_millis(5),
            throttle_pause: Duration::from_millis(2000),
        }
    }
}

/// Walk the connection at `data.<root>` until `hasNextPage` is false.
///
/// `variables` are sent with every page, merged with `first` and `after`.
///
/// # Errors
///
/// Returns `FetchError` when credentials fail, a page fails after retries,
/// or a page has no connection under `root`.
#[instrument(skip(executor, query, variables, options))]
pub async fn paginate<C, N>(
    executor: &Executor<C>,
    query: &'static str,
    root: &'static str,
    variables: Value,
    options: PageOptions,
) -> Result<Vec<N>, FetchError>
where
    C: GraphQLTransport,
    N: DeserializeOwned,
{
    let mut nodes = Vec::new();
    let mut after: Option<String> = None;
    let mut page = 0;

    loop {
        page += 1;
        let mut vars = variables.clone();
        if let Value::Object(map) = &mut vars {
            map.insert("first".to_string(), json!(options.page_size));
            map.insert("after".to_string(), json!(after));
        }

        let label = format!("{root} page {page}");
        let outcome = executor
            .execute::<Value>(&label, &GraphQLRequest::new(query, vars))
            .await?;
        let throttled = outcome.throttled;
        let mut data = outcome
            .result
            .map_err(|failure| FetchError::Page { root, page, failure })?;

        let connection = data.get_mut(root).map_or(Value::Null, Value::take);
        let connection: Connection<N> = serde_json::from_value(connection)
            .map_err(|source| FetchError::Shape { root, page, source })?;

        let fetched = connection.nodes.len();
        nodes.extend(connection.nodes);
        info!(page, fetched, total = nodes.len(), "Fetched {root}");

        after = connection
            .page_info
            .end_cursor
            .filter(|_| connection.page_info.has_next_page);
        if after.is_none() {
            break;
        }

        let pause = if throttled {
            options.throttle_pause
        } else {
            options.page_delay
        };
        tokio::time::sleep(pause).await;
    }

    Ok(nodes)
}

// =============================================================================
// Translatable resources
// =============================================================================

/// Export translatable resources of `resource_type`, keeping only the
/// content entries whose key is in `keys` (all keys when empty). Resources
/// left with no content are dropped.
///
/// # Errors
///
/// See [`paginate`].
pub async fn fetch_translatable_resources<C: GraphQLTransport>(
    executor: &Executor<C>,
    resource_type: &str,
    keys: &[String],
    options: PageOptions,
) -> Result<Vec<TranslatableResource>, FetchError> {
    let resources: Vec<TranslatableResource> = paginate(
        executor,
        queries::TRANSLATABLE_RESOURCES,
        "translatableResources",
        json!({ "resourceType": resource_type }),
        options,
    )
    .await?;

    Ok(filter_content_keys(resources, keys))
}

fn filter_content_keys(
    resources: Vec<TranslatableResource>,
    keys: &[String],
) -> Vec<TranslatableResource> {
    if keys.is_empty() {
        return resources;
    }
    let allowed: HashSet<FieldKey> = keys.iter().map(FieldKey::new).collect();

    resources
        .into_iter()
        .filter_map(|mut resource| {
            resource
                .translatable_content
                .retain(|content| allowed.contains(&content.key));
            (!resource.translatable_content.is_empty()).then_some(resource)
        })
        .collect()
}

// =============================================================================
// Customers and orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNode {
    pub id: String,
    pub default_email_address: Option<EmailAddress>,
}

impl CustomerNode {
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.default_email_address
            .as_ref()
            .and_then(|address| address.email_address.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderNode {
    pub id: String,
    pub email: Option<String>,
}

/// Export every customer whose email matches `blocklist`.
///
/// # Errors
///
/// See [`paginate`].
pub async fn fetch_customers<C: GraphQLTransport>(
    executor: &Executor<C>,
    blocklist: &DomainBlocklist,
    options: PageOptions,
) -> Result<Vec<CustomerNode>, FetchError> {
    let customers: Vec<CustomerNode> =
        paginate(executor, queries::CUSTOMERS, "customers", json!({}), options).await?;
    let total = customers.len();

    let matched: Vec<_> = customers
        .into_iter()
        .filter(|customer| customer.email().is_some_and(|e| blocklist.matches_str(e)))
        .collect();
    info!(total, matched = matched.len(), "Filtered customers by domain");
    Ok(matched)
}

/// Export every order whose email matches `blocklist`.
///
/// # Errors
///
/// See [`paginate`].
pub async fn fetch_orders<C: GraphQLTransport>(
    executor: &Executor<C>,
    blocklist: &DomainBlocklist,
    options: PageOptions,
) -> Result<Vec<OrderNode>, FetchError> {
    let orders: Vec<OrderNode> =
        paginate(executor, queries::ORDERS, "orders", json!({}), options).await?;
    let total = orders.len();

    let matched: Vec<_> = orders
        .into_iter()
        .filter(|order| order.email.as_deref().is_some_and(|e| blocklist.matches_str(e)))
        .collect();
    info!(total, matched = matched.len(), "Filtered orders by domain");
    Ok(matched)
}

// =============================================================================
// Products
// =============================================================================

/// A product and its first non-empty variant SKU (empty when it has none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSkuEntry {
    pub id: String,
    #[serde(default)]
    pub variant_skus: String,
}

#[derive(Debug, Deserialize)]
struct ProductNode {
    id: String,
    variants: Connection<VariantNode>,
}

#[derive(Debug, Deserialize)]
struct VariantNode {
    sku: Option<String>,
}

impl From<ProductNode> for ProductSkuEntry {
    fn from(node: ProductNode) -> Self {
        let variant_skus = node
            .variants
            .nodes
            .into_iter()
            .filter_map(|variant| variant.sku)
            .find(|sku| !sku.is_empty())
            .unwrap_or_default();
        Self {
            id: node.id,
            variant_skus,
        }
    }
}

/// Export every product with its SKU.
///
/// # Errors
///
/// See [`paginate`].
pub async fn fetch_products<C: GraphQLTransport>(
    executor: &Executor<C>,
    options: PageOptions,
) -> Result<Vec<ProductSkuEntry>, FetchError> {
    let products: Vec<ProductNode> =
        paginate(executor, queries::PRODUCTS, "products", json!({}), options).await?;
    Ok(products.into_iter().map(ProductSkuEntry::from).collect())
}

// =============================================================================
// Product media
// =============================================================================

/// One media item of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEntry {
    pub id: String,
    /// `IMAGE`, `EXTERNAL_VIDEO`, `VIDEO` or `MODEL_3D`.
    pub media_content_type: String,
}

/// A product and its media in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMediaEntry {
    pub id: String,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct ProductMediaNode {
    id: String,
    media: MediaNodes,
}

#[derive(Debug, Deserialize)]
struct MediaNodes {
    nodes: Vec<MediaEntry>,
}

/// Export every product with the first 40 of its media.
///
/// # Errors
///
/// See [`paginate`].
pub async fn fetch_product_media<C: GraphQLTransport>(
    executor: &Executor<C>,
    options: PageOptions,
) -> Result<Vec<ProductMediaEntry>, FetchError> {
    let products: Vec<ProductMediaNode> =
        paginate(executor, queries::PRODUCT_MEDIA, "products", json!({}), options).await?;
    Ok(products
        .into_iter()
        .map(|node| ProductMediaEntry {
            id: node.id,
            media: node.media.nodes,
        })
        .collect())
}
