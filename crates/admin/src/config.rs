//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPIFY_SHOP` - Shopify store domain (e.g., your-store.myshopify.com)
//!
//! ## Credentials (one of)
//! - `SHOPIFY_ACCESS_TOKEN` - Static Admin API token (custom apps, no refresh)
//! - `SESSION_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` database holding the
//!   app's offline session, plus `SHOPIFY_API_KEY` and `SHOPIFY_API_SECRET` for
//!   refreshing expired tokens (HIGH PRIVILEGE)
//!
//! ## Optional
//! - `SHOPIFY_API_VERSION` - API version (default: 2025-07)
//! - `SHOPIFY_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `BULKOPS_THROTTLE_KEYWORDS` - Extra comma-separated substrings that mark
//!   a GraphQL error as throttling
//! - `BULKOPS_TRANSIENT_KEYWORDS` - Extra comma-separated substrings that mark
//!   a transport error as retryable

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Admin API version the queries are written against.
pub const DEFAULT_API_VERSION: &str = "2025-07";

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Top-level configuration for the bulk operation commands.
#[derive(Debug, Clone)]
pub struct BulkOpsConfig {
    /// Shopify Admin API configuration
    pub shopify: ShopifyAdminConfig,
    /// Where access tokens come from
    pub credentials: CredentialsConfig,
    /// Additions to the built-in error keyword sets
    pub error_keywords: ErrorKeywordsConfig,
}

/// Keywords added to the built-in throttle and transient sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorKeywordsConfig {
    pub throttle: Vec<String>,
    pub transient: Vec<String>,
}

impl ErrorKeywordsConfig {
    fn from_env() -> Self {
        Self {
            throttle: env::optional("BULKOPS_THROTTLE_KEYWORDS")
                .map(|raw| keyword_list(&raw))
                .unwrap_or_default(),
            transient: env::optional("BULKOPS_TRANSIENT_KEYWORDS")
                .map(|raw| keyword_list(&raw))
                .unwrap_or_default(),
        }
    }
}

fn keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shopify Admin API configuration.
#[derive(Debug, Clone)]
pub struct ShopifyAdminConfig {
    /// Shopify store domain (e.g., your-store.myshopify.com)
    pub shop: String,
    /// Shopify API version (e.g., 2025-07)
    pub api_version: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
}

impl ShopifyAdminConfig {
    /// GraphQL endpoint for this shop and API version.
    #[must_use]
    pub fn graphql_endpoint(&self) -> String {
        format!(
            "https://{}/admin/api/{}/graphql.json",
            self.shop, self.api_version
        )
    }
}

/// Source of Admin API access tokens.
///
/// Implements `Debug` manually to redact the HIGH PRIVILEGE credentials.
#[derive(Clone)]
pub enum CredentialsConfig {
    /// A static token that never expires.
    StaticToken(SecretString),
    /// Offline session stored by the app, refreshed with the OAuth client.
    SessionDatabase {
        /// `PostgreSQL` connection URL (contains password)
        database_url: SecretString,
        /// OAuth client ID
        client_id: String,
        /// OAuth client secret (HIGH PRIVILEGE - full store access)
        client_secret: SecretString,
    },
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaticToken(_) => f
                .debug_tuple("StaticToken")
                .field(&"[REDACTED]")
                .finish(),
            Self::SessionDatabase { client_id, .. } => f
                .debug_struct("SessionDatabase")
                .field("database_url", &"[REDACTED]")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
        }
    }
}

impl BulkOpsConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            shopify: ShopifyAdminConfig::from_env()?,
            credentials: CredentialsConfig::from_env()?,
            error_keywords: ErrorKeywordsConfig::from_env(),
        })
    }
}

impl ShopifyAdminConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let shop = env::required("SHOPIFY_SHOP")?;
        if !shop.ends_with(".myshopify.com") {
            tracing::warn!(shop = %shop, "SHOPIFY_SHOP is not a myshopify.com domain");
        }

        let timeout_secs = match env::optional("SHOPIFY_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("SHOPIFY_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            shop,
            api_version: env::optional("SHOPIFY_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl CredentialsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        if let Some(token) = env::optional("SHOPIFY_ACCESS_TOKEN") {
            check_secret("SHOPIFY_ACCESS_TOKEN", &token)?;
            return Ok(Self::StaticToken(SecretString::from(token)));
        }

        // DATABASE_URL is accepted for apps sharing the session database.
        let database_url = env::optional("SESSION_DATABASE_URL")
            .or_else(|| env::optional("DATABASE_URL"))
            .ok_or_else(|| {
                ConfigError::MissingEnvVar(
                    "SHOPIFY_ACCESS_TOKEN or SESSION_DATABASE_URL".to_string(),
                )
            })?;

        let client_secret = env::required("SHOPIFY_API_SECRET")?;
        check_secret("SHOPIFY_API_SECRET", &client_secret)?;

        Ok(Self::SessionDatabase {
            database_url: SecretString::from(database_url),
            client_id: env::required("SHOPIFY_API_KEY")?,
            client_secret: SecretString::from(client_secret),
        })
    }
}

// =============================================================================
// Environment and secret checks
// =============================================================================

mod env {
    use super::ConfigError;

    pub fn required(key: &str) -> Result<String, ConfigError> {
        optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Unset and blank are the same.
    pub fn optional(key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Shannon entropy of `s` in bits per character.
fn bits_per_char(s: &str) -> f64 {
    let mut counts: HashMap<char, u32> = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_default() += 1;
    }
    let total: u32 = counts.values().sum();
    if total == 0 {
        return 0.0;
    }

    let total = f64::from(total);
    counts
        .values()
        .map(|&n| {
            let p = f64::from(n) / total;
            -p * p.log2()
        })
        .sum()
}

/// Reject placeholder values and low-entropy secrets before they reach Shopify.
fn check_secret(var: &str, secret: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var.to_string(),
            format!("looks like a placeholder ('{pattern}')"),
        ));
    }

    let entropy = bits_per_char(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var.to_string(),
            format!("{entropy:.2} bits/char, at least {MIN_ENTROPY_BITS_PER_CHAR:.1} required"),
        ));
    }
    Ok(())
}
