//! HTTP transport for the Admin GraphQL endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use tracing::{instrument, warn};

use crate::auth::TokenProvider;
use crate::config::ShopifyAdminConfig;

use super::{AdminShopifyError, GraphQLRequest, GraphQLResponse, GraphQLTransport};

/// Seconds to wait after a 429 without a `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 2;

/// Shopify Admin API GraphQL client.
///
/// Cheap to clone; all clones share one connection pool and token provider.
///
/// # Security
///
/// Sends a HIGH PRIVILEGE access token with every request.
#[derive(Clone)]
pub struct AdminClient {
    inner: Arc<AdminClientInner>,
}

struct AdminClientInner {
    client: reqwest::Client,
    shop: String,
    endpoint: String,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for AdminClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminClient")
            .field("shop", &self.inner.shop)
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

impl AdminClient {
    /// Create a new Admin API client.
    ///
    /// # Errors
    ///
    /// Returns `AdminShopifyError::Http` if the HTTP client cannot be built.
    pub fn new(
        config: &ShopifyAdminConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, AdminShopifyError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_http_client(client, config, tokens))
    }

    /// Create a client around an existing `reqwest::Client`.
    #[must_use]
    pub fn with_http_client(
        client: reqwest::Client,
        config: &ShopifyAdminConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(AdminClientInner {
                client,
                shop: config.shop.clone(),
                endpoint: config.graphql_endpoint(),
                tokens,
            }),
        }
    }

    /// Get the shop domain.
    #[must_use]
    pub fn shop(&self) -> &str {
        &self.inner.shop
    }

    async fn send(
        &self,
        request: &GraphQLRequest,
        token: &SecretString,
    ) -> Result<reqwest::Response, AdminShopifyError> {
        Ok(self
            .inner
            .client
            .post(&self.inner.endpoint)
            .header("X-Shopify-Access-Token", token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await?)
    }
}

#[async_trait]
impl GraphQLTransport for AdminClient {
    #[instrument(skip(self, request), fields(shop = %self.inner.shop))]
    async fn post(
        &self,
        request: &GraphQLRequest,
    ) -> Result<GraphQLResponse<serde_json::Value>, AdminShopifyError> {
        let shop = self.inner.shop.as_str();
        let token = self.inner.tokens.access_token(shop).await?;
        let mut response = self.send(request, &token).await?;

        // One refresh per call; a second 401 means the credentials are bad.
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Admin API returned 401, refreshing access token");
            let token = self.inner.tokens.refresh(shop, &token).await?;
            response = self.send(request, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(AdminShopifyError::Unauthorized(
                    "access token rejected after refresh".to_string(),
                ));
            }
        }

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AdminShopifyError::RateLimited(retry_after_secs(
                response.headers(),
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AdminShopifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(DEFAULT_RETRY_AFTER_SECS, |secs| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Checked finite and non-negative
            let secs = secs.ceil() as u64;
            secs
        })
}
