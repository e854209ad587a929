//! Shopify Admin API client (HIGH PRIVILEGE).
//!
//! # Security
//!
//! **CRITICAL: This module sends the high-privilege Shopify Admin API token.**
//!
//! The Admin API has full access to products, orders, and customers, and the
//! jobs built on it delete data. Tokens come from an [`auth::TokenProvider`]
//! and are never logged.
//!
//! # Architecture
//!
//! - Queries are literal GraphQL strings ([`queries`]) with `serde_json`
//!   variables
//! - [`GraphQLTransport`] is the seam between the retry logic and HTTP, so
//!   the executor and runner can be driven by a fake in tests
//! - Throttle readings come from `extensions.cost.throttleStatus`
//!
//! [`auth::TokenProvider`]: crate::auth::TokenProvider

mod client;
pub mod queries;
pub mod types;

pub use client::AdminClient;
pub use types::*;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::AuthError;

/// Errors that can occur when interacting with Shopify Admin API.
#[derive(Debug, Error)]
pub enum AdminShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status other than 401 and 429.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Rate limited by Shopify.
    #[error("Rate limited (429), retry after {0} seconds")]
    RateLimited(u64),

    /// Authentication failed even after a token refresh.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials could not be loaded or refreshed.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A call was made on a dry run's [`ApiLink::Offline`].
    #[error("not connected to the Admin API (dry run)")]
    Offline,
}

impl AdminShopifyError {
    /// Whether the error means no further call can succeed, so a running
    /// job should stop rather than record an item failure.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Unauthorized(_) | Self::Offline)
    }
}

/// A GraphQL error returned by the Shopify Admin API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphQLError {
    /// Error message.
    pub message: String,
    /// Source locations in the query.
    #[serde(default)]
    pub locations: Vec<GraphQLErrorLocation>,
    /// Path to the error in the response.
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
}

impl GraphQLError {
    /// An error with only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
        }
    }
}

/// Location in a GraphQL query where an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphQLErrorLocation {
    /// Line number (1-indexed).
    pub line: i64,
    /// Column number (1-indexed).
    pub column: i64,
}

/// Join error messages with `; `.
#[must_use]
pub fn format_graphql_errors(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.clone())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Sends one GraphQL request and returns the decoded envelope.
///
/// Implementations handle authentication and HTTP status codes. GraphQL
/// `errors` and throttle readings are returned in the envelope for the
/// executor to classify.
#[async_trait]
pub trait GraphQLTransport: Send + Sync {
    async fn post(
        &self,
        request: &GraphQLRequest,
    ) -> Result<GraphQLResponse<serde_json::Value>, AdminShopifyError>;
}

#[async_trait]
impl<T: GraphQLTransport + ?Sized> GraphQLTransport for std::sync::Arc<T> {
    async fn post(
        &self,
        request: &GraphQLRequest,
    ) -> Result<GraphQLResponse<serde_json::Value>, AdminShopifyError> {
        (**self).post(request).await
    }
}

/// The transport a command runs on.
///
/// Dry runs use [`ApiLink::Offline`], which needs no credentials and
/// refuses every call.
#[derive(Debug, Clone)]
pub enum ApiLink {
    Live(AdminClient),
    Offline,
}

#[async_trait]
impl GraphQLTransport for ApiLink {
    async fn post(
        &self,
        request: &GraphQLRequest,
    ) -> Result<GraphQLResponse<serde_json::Value>, AdminShopifyError> {
        match self {
            Self::Live(client) => client.post(request).await,
            Self::Offline => Err(AdminShopifyError::Offline),
        }
    }
}
