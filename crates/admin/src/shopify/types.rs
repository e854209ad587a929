//! Wire types shared by every Admin API call.

use bulkops_core::ThrottleReading;
use serde::{Deserialize, Serialize};

use super::GraphQLError;

// =============================================================================
// Request / Response envelope
// =============================================================================

/// Body of a GraphQL POST.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQLRequest {
    pub query: &'static str,
    pub variables: serde_json::Value,
}

impl GraphQLRequest {
    #[must_use]
    pub const fn new(query: &'static str, variables: serde_json::Value) -> Self {
        Self { query, variables }
    }
}

/// GraphQL response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
    #[serde(default)]
    pub extensions: Option<Extensions>,
}

impl<T> GraphQLResponse<T> {
    /// Throttle bucket state reported with this response, if any.
    #[must_use]
    pub fn throttle_reading(&self) -> Option<ThrottleReading> {
        let cost = self.extensions.as_ref()?.cost.as_ref()?;
        Some(ThrottleReading {
            currently_available: cost.throttle_status.currently_available,
            maximum_available: cost.throttle_status.maximum_available,
            restore_rate: cost.throttle_status.restore_rate,
            actual_cost: cost.actual_query_cost,
        })
    }

    /// Non-empty top-level errors.
    #[must_use]
    pub fn errors(&self) -> &[GraphQLError] {
        self.errors.as_deref().unwrap_or_default()
    }
}

/// `extensions` block of a response.
#[derive(Debug, Clone, Deserialize)]
pub struct Extensions {
    #[serde(default)]
    pub cost: Option<QueryCost>,
}

/// Query cost report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCost {
    #[serde(default)]
    pub requested_query_cost: Option<f64>,
    #[serde(default)]
    pub actual_query_cost: Option<f64>,
    pub throttle_status: ThrottleStatus,
}

/// Token bucket state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleStatus {
    pub maximum_available: f64,
    pub currently_available: f64,
    pub restore_rate: f64,
}

// =============================================================================
// Pagination
// =============================================================================

/// Pagination information for cursor-based queries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

/// A `nodes` connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<N> {
    pub nodes: Vec<N>,
    pub page_info: PageInfo,
}

// =============================================================================
// Mutation user errors
// =============================================================================

/// A `userErrors` entry from a mutation payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.field) {
            (Some(code), _) => write!(f, "{code}: {}", self.message),
            (None, Some(field)) if !field.is_empty() => {
                write!(f, "{}: {}", field.join("."), self.message)
            }
            _ => f.write_str(&self.message),
        }
    }
}

/// Response data that can carry mutation `userErrors`.
pub trait UserErrors {
    /// Errors the mutation reported. Queries report none.
    fn user_errors(&self) -> Vec<UserError> {
        Vec::new()
    }
}

impl UserErrors for serde_json::Value {}
