//! Integration tests for the bulk operation tools.
//!
//! The tests drive the real runner, executor and ledger against
//! [`FakeTransport`], an in-process stand-in for the Admin API that answers
//! each resource according to a script.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bulkops-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bulkops_admin::shopify::{GraphQLRequest, GraphQLResponse};
use bulkops_admin::{AdminShopifyError, GraphQLTransport, Row};
use bulkops_core::{ResourceKey, TranslatableContent, TranslatableResource};
use bulkops_core::{ContentDigest, FieldKey, Locale};
use serde_json::{Value, json};

/// Mutation payload keys the fake answers under. Each job's data type picks
/// its own key and ignores the rest.
const PAYLOAD_KEYS: &[&str] = &[
    "translationsRegister",
    "tagsAdd",
    "productUpdate",
    "productReorderMedia",
    "collectionUpdate",
    "customerDelete",
    "orderDelete",
];

/// How the fake answers one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    /// Mutation `userErrors` with this message.
    UserError(String),
    /// Top-level GraphQL error with this message.
    GraphQLError(String),
    /// Top-level `Throttled` error with an empty bucket.
    Throttled,
    /// Credentials rejected.
    Unauthorized,
    /// The call's future panics.
    Panic,
}

/// Scripted Admin API.
///
/// Each resource has a queue of replies; once it is drained the resource
/// gets the default reply ([`Reply::Ok`] unless changed).
#[derive(Debug, Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    default: Option<Reply>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Value>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `replies` for `resource`.
    #[must_use]
    pub fn script(self, resource: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(resource.to_string())
            .or_default()
            .extend(replies);
        self
    }

    #[must_use]
    pub fn with_default(mut self, reply: Reply) -> Self {
        self.default = Some(reply);
        self
    }

    /// Total calls received, retries included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Variables of every call, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Resource IDs of every call, in arrival order.
    pub fn resources_called(&self) -> Vec<String> {
        self.requests().iter().filter_map(resource_of).collect()
    }

    fn next_reply(&self, resource: Option<&str>) -> Reply {
        let scripted = resource.and_then(|id| {
            self.scripts
                .lock()
                .unwrap()
                .get_mut(id)
                .and_then(VecDeque::pop_front)
        });
        scripted
            .or_else(|| self.default.clone())
            .unwrap_or(Reply::Ok)
    }
}

/// The resource a mutation's variables target.
#[must_use]
pub fn resource_of(variables: &Value) -> Option<String> {
    [
        &variables["resourceId"],
        &variables["id"],
        &variables["orderId"],
        &variables["product"]["id"],
        &variables["input"]["id"],
    ]
    .into_iter()
    .find_map(|v| v.as_str().map(str::to_string))
}

fn throttle_extensions(available: f64) -> Value {
    json!({
        "cost": {
            "requestedQueryCost": 10,
            "actualQueryCost": 10,
            "throttleStatus": {
                "maximumAvailable": 2000.0,
                "currentlyAvailable": available,
                "restoreRate": 100.0
            }
        }
    })
}

fn payload(user_errors: &Value) -> Value {
    let data: serde_json::Map<String, Value> = PAYLOAD_KEYS
        .iter()
        .map(|key| ((*key).to_string(), json!({ "userErrors": user_errors })))
        .collect();
    Value::Object(data)
}

#[async_trait]
impl GraphQLTransport for FakeTransport {
    async fn post(
        &self,
        request: &GraphQLRequest,
    ) -> Result<GraphQLResponse<Value>, AdminShopifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.variables.clone());
        let resource = resource_of(&request.variables);

        let body = match self.next_reply(resource.as_deref()) {
            Reply::Ok => json!({
                "data": payload(&json!([])),
                "extensions": throttle_extensions(1900.0)
            }),
            Reply::UserError(message) => json!({
                "data": payload(&json!([{ "field": ["translations"], "message": message }])),
                "extensions": throttle_extensions(1900.0)
            }),
            Reply::GraphQLError(message) => json!({
                "errors": [{ "message": message }]
            }),
            Reply::Throttled => json!({
                "errors": [{ "message": "Throttled" }],
                "extensions": throttle_extensions(0.0)
            }),
            Reply::Unauthorized => {
                return Err(AdminShopifyError::Unauthorized(
                    "Invalid API key or access token".to_string(),
                ));
            }
            Reply::Panic => panic!("transport exploded for {resource:?}"),
        };

        Ok(serde_json::from_value(body).unwrap())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A resource with one content entry per `(key, locale, digest)`.
#[must_use]
pub fn resource(id: &str, contents: &[(&str, &str, &str)]) -> TranslatableResource {
    TranslatableResource {
        resource_id: ResourceKey::new(id),
        translatable_content: contents
            .iter()
            .map(|(key, locale, digest)| TranslatableContent {
                key: FieldKey::new(*key),
                locale: Locale::new(*locale),
                digest: Some(ContentDigest::new(*digest)),
                value: None,
            })
            .collect(),
    }
}

/// An input row from `(column, value)` pairs.
#[must_use]
pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(column, value)| ((*column).to_string(), (*value).to_string()))
        .collect()
}
