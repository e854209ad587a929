//! Throttle-aware execution of a single GraphQL call.
//!
//! [`Executor::execute`] sends one request and classifies the result:
//!
//! | Result                                        | Action                          |
//! |-----------------------------------------------|---------------------------------|
//! | Transport error matching the transient set    | back off, retry                 |
//! | GraphQL `errors` matching the throttle set    | back off, retry                 |
//! | Other GraphQL `errors`, or `userErrors`       | fail immediately                |
//! | Credentials missing or rejected after refresh | return `Err` (fatal)            |
//! | Success                                       | pause if the budget is low, return |
//!
//! Backoff is `min(base * 2^attempt, max)` plus up to `max_jitter` of random
//! jitter. The executor never touches the progress ledger.

use std::time::Duration;

use bulkops_core::ThrottleReading;
use rand::Rng;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ErrorKeywordsConfig;
use crate::shopify::{
    AdminShopifyError, GraphQLError, GraphQLRequest, GraphQLTransport, UserError, UserErrors,
    format_graphql_errors,
};

/// Retry and pacing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random jitter added to each backoff.
    pub max_jitter: Duration,
    /// Pause after a success when `currentlyAvailable` is below this.
    pub low_water_mark: f64,
    pub low_budget_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            max_jitter: Duration::from_millis(500),
            low_water_mark: 100.0,
            low_budget_pause: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`, without jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Backoff plus jitter in `[0, max_jitter)`.
    #[must_use]
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max))
    }
}

/// Case-insensitive substring match against a keyword set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub const THROTTLE_KEYWORDS: &'static [&'static str] = &["throttl"];

    pub const TRANSIENT_KEYWORDS: &'static [&'static str] = &[
        "429",
        "500",
        "502",
        "503",
        "throttl",
        "econnreset",
        "etimedout",
        "connection reset",
        "timed out",
        "fetch failed",
    ];

    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Recognizes throttle messages in GraphQL `errors`.
    #[must_use]
    pub fn throttle() -> Self {
        Self::new(Self::THROTTLE_KEYWORDS)
    }

    /// Recognizes retryable transport failures.
    #[must_use]
    pub fn transient() -> Self {
        Self::new(Self::TRANSIENT_KEYWORDS)
    }

    /// This set plus `extra`.
    #[must_use]
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for keyword in Self::new(extra).keywords {
            if !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
        self
    }

    #[must_use]
    pub fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.keywords.iter().any(|k| message.contains(k.as_str()))
    }
}

/// Why a call did not succeed. Always an item-level failure; fatal errors
/// are returned separately by [`Executor::execute`].
#[derive(Debug, Error)]
pub enum CallFailure {
    /// Transport error that was not retryable or exhausted its retries.
    #[error("{0}")]
    Transport(AdminShopifyError),

    /// Still throttled after every retry.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    Throttled(Vec<GraphQLError>),

    /// Non-throttle top-level GraphQL errors.
    #[error("GraphQL errors: {}", format_graphql_errors(.0))]
    GraphQL(Vec<GraphQLError>),

    /// Mutation `userErrors`.
    #[error("{}", format_user_errors(.0))]
    UserErrors(Vec<UserError>),

    /// Response had neither `errors` nor `data`.
    #[error("response contained no data")]
    MissingData,

    /// `data` did not match the expected shape.
    #[error("unexpected response shape: {0}")]
    Decode(serde_json::Error),

    /// The item's future panicked.
    #[error("panicked: {0}")]
    Panicked(String),
}

fn format_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of [`Executor::execute`].
#[derive(Debug)]
pub struct CallOutcome<T> {
    pub result: Result<T, CallFailure>,
    /// Last throttle reading seen across attempts.
    pub throttle: Option<ThrottleReading>,
    /// A throttle retry, transient retry, or low-budget pause happened.
    pub throttled: bool,
    pub attempts: u32,
}

impl<T> CallOutcome<T> {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs GraphQL calls through a transport with retries.
#[derive(Debug, Clone)]
pub struct Executor<C> {
    transport: C,
    policy: RetryPolicy,
    throttle: KeywordClassifier,
    transient: KeywordClassifier,
}

impl<C: GraphQLTransport> Executor<C> {
    #[must_use]
    pub fn new(transport: C, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            throttle: KeywordClassifier::throttle(),
            transient: KeywordClassifier::transient(),
        }
    }

    /// Replace the default keyword sets.
    #[must_use]
    pub fn with_classifiers(mut self, throttle: KeywordClassifier, transient: KeywordClassifier) -> Self {
        self.throttle = throttle;
        self.transient = transient;
        self
    }

    /// Extend the default keyword sets with configured additions.
    #[must_use]
    pub fn with_error_keywords(self, keywords: &ErrorKeywordsConfig) -> Self {
        self.with_classifiers(
            KeywordClassifier::throttle().with_extra(&keywords.throttle),
            KeywordClassifier::transient().with_extra(&keywords.transient),
        )
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub const fn transport(&self) -> &C {
        &self.transport
    }

    /// Send `request`, retrying transient and throttle failures.
    ///
    /// `label` prefixes log lines (usually the resource being mutated).
    ///
    /// # Errors
    ///
    /// Returns the transport error when it is fatal (see
    /// [`AdminShopifyError::is_fatal`]). Every other failure is reported in
    /// [`CallOutcome::result`].
    pub async fn execute<T>(
        &self,
        label: &str,
        request: &GraphQLRequest,
    ) -> Result<CallOutcome<T>, AdminShopifyError>
    where
        T: DeserializeOwned + UserErrors,
    {
        let max_retries = self.policy.max_retries;
        let mut throttled = false;
        let mut reading: Option<ThrottleReading> = None;
        let mut attempt = 0;

        loop {
            let response = match self.transport.post(request).await {
                Ok(response) => response,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    if attempt < max_retries && self.is_transient(&err) {
                        let delay = self.transient_delay(attempt, &err);
                        warn!(
                            label,
                            attempt = attempt + 1,
                            max_retries,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %err,
                            "Transient error, retrying"
                        );
                        throttled = true;
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(outcome(Err(CallFailure::Transport(err)), throttled, reading, attempt));
                }
            };

            // The low-budget pause looks at this attempt only; `reading`
            // keeps the last one seen for the caller.
            let current = response.throttle_reading();
            if current.is_some() {
                reading = current;
            }

            let errors = response.errors();
            if !errors.is_empty() {
                let message = format_graphql_errors(errors);
                if !self.throttle.matches(&message) {
                    return Ok(outcome(
                        Err(CallFailure::GraphQL(errors.to_vec())),
                        throttled,
                        reading,
                        attempt,
                    ));
                }

                throttled = true;
                if attempt >= max_retries {
                    return Ok(outcome(
                        Err(CallFailure::Throttled(errors.to_vec())),
                        throttled,
                        reading,
                        attempt,
                    ));
                }

                let delay = self.policy.backoff_with_jitter(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Throttled, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let Some(data) = response.data else {
                return Ok(outcome(Err(CallFailure::MissingData), throttled, reading, attempt));
            };
            let data: T = match serde_json::from_value(data) {
                Ok(data) => data,
                Err(err) => {
                    return Ok(outcome(Err(CallFailure::Decode(err)), throttled, reading, attempt));
                }
            };

            let user_errors = data.user_errors();
            if !user_errors.is_empty() {
                return Ok(outcome(
                    Err(CallFailure::UserErrors(user_errors)),
                    throttled,
                    reading,
                    attempt,
                ));
            }

            if let Some(current) = current
                && current.is_below(self.policy.low_water_mark)
            {
                info!(
                    label,
                    available = current.currently_available,
                    "Throttle budget low, pausing"
                );
                throttled = true;
                tokio::time::sleep(self.policy.low_budget_pause).await;
            }

            return Ok(outcome(Ok(data), throttled, reading, attempt));
        }
    }

    fn is_transient(&self, err: &AdminShopifyError) -> bool {
        match err {
            AdminShopifyError::RateLimited(_) => true,
            AdminShopifyError::Status { status, .. } if *status >= 500 => true,
            AdminShopifyError::Http(e) if e.is_timeout() || e.is_connect() => true,
            AdminShopifyError::Http(e) => self.transient.matches(&error_chain(e)),
            other => self.transient.matches(&other.to_string()),
        }
    }

    fn transient_delay(&self, attempt: u32, err: &AdminShopifyError) -> Duration {
        let backoff = self.policy.backoff_with_jitter(attempt);
        match err {
            AdminShopifyError::RateLimited(secs) => backoff.max(Duration::from_secs(*secs)),
            _ => backoff,
        }
    }
}

fn outcome<T>(
    result: Result<T, CallFailure>,
    throttled: bool,
    throttle: Option<ThrottleReading>,
    attempt: u32,
) -> CallOutcome<T> {
    CallOutcome {
        result,
        throttle,
        throttled,
        attempts: attempt + 1,
    }
}

/// Display of an error and all of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::shopify::GraphQLResponse;

    type Scripted = Result<serde_json::Value, AdminShopifyError>;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Scripted>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Scripted>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GraphQLTransport for ScriptedTransport {
        async fn post(
            &self,
            _request: &GraphQLRequest,
        ) -> Result<GraphQLResponse<serde_json::Value>, AdminShopifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            match next {
                Some(Ok(body)) => Ok(serde_json::from_value(body)?),
                Some(Err(err)) => Err(err),
                None => panic!("no scripted response left"),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TagsAddData {
        tags_add: TagsAddPayload,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TagsAddPayload {
        user_errors: Vec<UserError>,
    }

    impl UserErrors for TagsAddData {
        fn user_errors(&self) -> Vec<UserError> {
            self.tags_add.user_errors.clone()
        }
    }

    fn ok_body(available: f64) -> serde_json::Value {
        json!({
            "data": {"tagsAdd": {"node": {"id": "gid://shopify/Product/1"}, "userErrors": []}},
            "extensions": {"cost": {
                "requestedQueryCost": 10,
                "actualQueryCost": 10,
                "throttleStatus": {"maximumAvailable": 2000.0, "currentlyAvailable": available, "restoreRate": 100.0}
            }}
        })
    }

    fn bare_ok_body() -> serde_json::Value {
        json!({"data": {"tagsAdd": {"userErrors": []}}})
    }

    fn throttled_body() -> serde_json::Value {
        json!({"errors": [{"message": "Throttled", "extensions": {"code": "THROTTLED"}}]})
    }

    fn request() -> GraphQLRequest {
        GraphQLRequest::new("mutation", json!({}))
    }

    fn executor(responses: Vec<Scripted>, max_retries: u32) -> Executor<ScriptedTransport> {
        Executor::new(
            ScriptedTransport::new(responses),
            RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            },
        )
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(16_000));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(30_000));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(30_000));

        for attempt in 0..8 {
            let delay = policy.backoff_with_jitter(attempt);
            assert!(delay >= policy.backoff_delay(attempt));
            assert!(delay < policy.backoff_delay(attempt) + Duration::from_millis(500));
        }
    }

    #[test]
    fn test_zero_jitter() {
        let policy = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_with_jitter(0), Duration::from_millis(1000));
    }

    #[test]
    fn test_classifiers() {
        let throttle = KeywordClassifier::throttle();
        assert!(throttle.matches("Throttled"));
        assert!(!throttle.matches("Invalid id"));

        let transient = KeywordClassifier::transient();
        assert!(transient.matches("HTTP 503: Service Unavailable"));
        assert!(transient.matches("read ECONNRESET"));
        assert!(!transient.matches("HTTP 400: Bad Request"));

        let custom = KeywordClassifier::new(["Too Many", ""]);
        assert!(custom.matches("too many requests"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_retry_then_success() {
        let executor = executor(vec![Ok(throttled_body()), Ok(ok_body(1500.0))], 6);
        let start = Instant::now();

        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();

        assert!(outcome.is_success());
        assert!(outcome.throttled);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(executor.transport().calls(), 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_exhaustion_is_failure() {
        let executor = executor(vec![Ok(throttled_body()), Ok(throttled_body()), Ok(throttled_body())], 2);

        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();

        assert!(matches!(outcome.result, Err(CallFailure::Throttled(_))));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(executor.transport().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_retried_until_exhausted() {
        let executor = executor(
            vec![
                Err(AdminShopifyError::Status { status: 502, body: "Bad Gateway".into() }),
                Err(AdminShopifyError::RateLimited(2)),
                Err(AdminShopifyError::Status { status: 503, body: "Unavailable".into() }),
            ],
            2,
        );

        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();

        let err = outcome.result.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: Unavailable");
        assert!(outcome.throttled);
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_status_not_retried() {
        let executor = executor(
            vec![Err(AdminShopifyError::Status { status: 400, body: "Bad Request".into() })],
            6,
        );
        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();
        assert!(matches!(outcome.result, Err(CallFailure::Transport(_))));
        assert_eq!(executor.transport().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_business_errors_not_retried() {
        let user_error = json!({
            "data": {"tagsAdd": {"node": null, "userErrors": [{"field": ["id"], "message": "Product does not exist"}]}}
        });
        let graphql_error = json!({"errors": [{"message": "Invalid global id"}]});
        let executor = executor(vec![Ok(user_error), Ok(graphql_error)], 6);

        let first = executor.execute::<TagsAddData>("A", &request()).await.unwrap();
        assert_eq!(first.result.unwrap_err().to_string(), "id: Product does not exist");
        assert!(!first.throttled);

        let second = executor.execute::<TagsAddData>("B", &request()).await.unwrap();
        assert_eq!(second.result.unwrap_err().to_string(), "GraphQL errors: Invalid global id");
        assert_eq!(executor.transport().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_budget_pauses_after_success() {
        let executor = executor(vec![Ok(ok_body(40.0))], 6);
        let start = Instant::now();

        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();

        assert!(outcome.is_success());
        assert!(outcome.throttled);
        assert!(start.elapsed() >= Duration::from_millis(1000));
        let reading = outcome.throttle.unwrap();
        assert!((reading.currently_available - 40.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_low_reading_does_not_pause_success() {
        let throttled_low = json!({
            "errors": [{"message": "Throttled"}],
            "extensions": {"cost": {
                "requestedQueryCost": 10,
                "throttleStatus": {"maximumAvailable": 2000.0, "currentlyAvailable": 5.0, "restoreRate": 100.0}
            }}
        });
        let executor = executor(vec![Ok(throttled_low), Ok(bare_ok_body())], 6);
        let start = Instant::now();

        let outcome = executor.execute::<TagsAddData>("A", &request()).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts, 2);
        // One backoff with jitter, no low-budget pause on top.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500), "{elapsed:?}");
        let reading = outcome.throttle.unwrap();
        assert!((reading.currently_available - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classifier_with_extra() {
        let throttle = KeywordClassifier::throttle().with_extra(["Rate exceeded", "THROTTL", " "]);
        assert!(throttle.matches("Throttled"));
        assert!(throttle.matches("rate exceeded for shop"));
        assert_eq!(throttle, KeywordClassifier::new(["throttl", "rate exceeded"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_throttle_keyword_is_retried() {
        let rate_exceeded = json!({"errors": [{"message": "Rate exceeded"}]});
        let keywords = ErrorKeywordsConfig {
            throttle: vec!["rate exceeded".to_string()],
            transient: Vec::new(),
        };

        let plain = executor(vec![Ok(rate_exceeded.clone())], 6);
        let outcome = plain.execute::<TagsAddData>("A", &request()).await.unwrap();
        assert!(matches!(outcome.result, Err(CallFailure::GraphQL(_))));

        let configured = executor(vec![Ok(rate_exceeded), Ok(ok_body(1500.0))], 6)
            .with_error_keywords(&keywords);
        let outcome = configured.execute::<TagsAddData>("A", &request()).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.throttled);
        assert_eq!(configured.transport().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_returned() {
        let executor = executor(vec![Err(AdminShopifyError::Unauthorized("rejected".into()))], 6);
        let result = executor.execute::<TagsAddData>("A", &request()).await;
        assert!(matches!(result, Err(AdminShopifyError::Unauthorized(_))));
        assert_eq!(executor.transport().calls(), 1);
    }
}
