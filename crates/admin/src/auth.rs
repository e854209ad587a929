//! Admin API access tokens.
//!
//! Apps installed through OAuth store an offline session (`offline_{shop}`)
//! whose access token expires. [`SessionTokenProvider`] loads that session,
//! refreshes it through the shop's OAuth endpoint when it is about to expire
//! or when the API rejects it, and writes the refreshed session back.
//!
//! Refreshes are single-flight: concurrent callers that all notice an expired
//! token wait on one mutex, and only the first performs the refresh.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Tokens are treated as expired this long before their real expiry.
const EARLY_REFRESH_SECS: i64 = 5 * 60;

/// Errors from loading or refreshing credentials. All of them are fatal to a
/// running job.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No offline session row for the shop.
    #[error("no offline session found for {shop} (expected session id {session_id}); has the app been installed on this store?")]
    MissingSession { shop: String, session_id: String },

    /// The access token expired and there is nothing to refresh it with.
    #[error("access token is expired but no refresh token is available; reinstall the app to get fresh tokens")]
    NoRefreshToken,

    /// The OAuth endpoint rejected the refresh.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// HTTP request to the OAuth endpoint failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Session store query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Session id the Shopify app framework uses for a shop's offline session.
#[must_use]
pub fn offline_session_id(shop: &str) -> String {
    format!("offline_{shop}")
}

/// An offline session as stored by the app.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub id: String,
    pub shop: String,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// `None` for tokens that never expire.
    pub expires: Option<DateTime<Utc>>,
    pub refresh_token_expires: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Whether the access token expires within the early-refresh window.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_some_and(|expires| expires - TimeDelta::seconds(EARLY_REFRESH_SECS) < now)
    }

    fn with_refreshed(self, token: RefreshedToken, now: DateTime<Utc>) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token.or(self.refresh_token),
            expires: Some(now + TimeDelta::seconds(token.expires_in)),
            refresh_token_expires: token
                .refresh_token_expires_in
                .map(|secs| now + TimeDelta::seconds(secs))
                .or(self.refresh_token_expires),
            ..self
        }
    }
}

// =============================================================================
// Session storage
// =============================================================================

/// Persistent storage for offline sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id.
    async fn load(&self, session_id: &str) -> Result<Option<StoredSession>, AuthError>;

    /// Write back the tokens and expiries of a session.
    async fn save(&self, session: &StoredSession) -> Result<(), AuthError>;
}

/// Sessions in the app's `PostgreSQL` `"Session"` table.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    shop: String,
    #[sqlx(rename = "accessToken")]
    access_token: String,
    #[sqlx(rename = "refreshToken")]
    refresh_token: Option<String>,
    expires: Option<NaiveDateTime>,
    #[sqlx(rename = "refreshTokenExpires")]
    refresh_token_expires: Option<NaiveDateTime>,
}

impl From<SessionRow> for StoredSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            shop: row.shop,
            access_token: SecretString::from(row.access_token),
            refresh_token: row.refresh_token.map(SecretString::from),
            expires: row.expires.map(|at| at.and_utc()),
            refresh_token_expires: row.refresh_token_expires.map(|at| at.and_utc()),
        }
    }
}

impl PgSessionStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the session database.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Database` if the connection cannot be established.
    pub async fn connect(database_url: &SecretString) -> Result<Self, AuthError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, session_id: &str) -> Result<Option<StoredSession>, AuthError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, shop, "accessToken", "refreshToken", expires, "refreshTokenExpires"
            FROM "Session"
            WHERE id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StoredSession::from))
    }

    async fn save(&self, session: &StoredSession) -> Result<(), AuthError> {
        sqlx::query::<sqlx::Postgres>(
            r#"
            UPDATE "Session"
            SET "accessToken" = $2, "refreshToken" = $3, expires = $4, "refreshTokenExpires" = $5
            WHERE id = $1
            "#,
        )
        .bind(&session.id)
        .bind(session.access_token.expose_secret())
        .bind(session.refresh_token.as_ref().map(|t| t.expose_secret().to_owned()))
        .bind(session.expires.map(|at| at.naive_utc()))
        .bind(session.refresh_token_expires.map(|at| at.naive_utc()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Token refresh
// =============================================================================

/// Tokens returned by a successful refresh.
#[derive(Debug)]
pub struct RefreshedToken {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Refresh token lifetime in seconds.
    pub refresh_token_expires_in: Option<i64>,
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        shop: &str,
        refresh_token: &SecretString,
    ) -> Result<RefreshedToken, AuthError>;
}

/// Refreshes tokens through `https://{shop}/admin/oauth/access_token`.
pub struct OAuthRefresher {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
}

impl std::fmt::Debug for OAuthRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthRefresher")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    #[serde(default)]
    refresh_token_expires_in: Option<i64>,
}

impl OAuthRefresher {
    #[must_use]
    pub const fn new(client: reqwest::Client, client_id: String, client_secret: SecretString) -> Self {
        Self {
            client,
            client_id,
            client_secret,
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    #[instrument(skip(self, refresh_token))]
    async fn refresh(
        &self,
        shop: &str,
        refresh_token: &SecretString,
    ) -> Result<RefreshedToken, AuthError> {
        let response = self
            .client
            .post(format!("https://{shop}/admin/oauth/access_token"))
            .json(&RefreshRequest {
                client_id: &self.client_id,
                client_secret: self.client_secret.expose_secret(),
                grant_type: "refresh_token",
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::RefreshFailed(format!("HTTP {status}: {body}")));
        }

        let data: RefreshResponse = response.json().await?;
        Ok(RefreshedToken {
            access_token: SecretString::from(data.access_token),
            refresh_token: data.refresh_token.map(SecretString::from),
            expires_in: data.expires_in,
            refresh_token_expires_in: data.refresh_token_expires_in,
        })
    }
}

// =============================================================================
// Token providers
// =============================================================================

/// Supplies the access token sent with every Admin API request.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A token that is not about to expire.
    async fn access_token(&self, shop: &str) -> Result<SecretString, AuthError>;

    /// Replace a token the API rejected with 401.
    ///
    /// If another caller already replaced `rejected`, the newer token is
    /// returned without a second refresh.
    async fn refresh(&self, shop: &str, rejected: &SecretString) -> Result<SecretString, AuthError>;
}

/// A fixed token from the environment. Cannot be refreshed.
pub struct StaticTokenProvider {
    token: SecretString,
}

impl StaticTokenProvider {
    #[must_use]
    pub const fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self, _shop: &str) -> Result<SecretString, AuthError> {
        Ok(self.token.clone())
    }

    async fn refresh(&self, _shop: &str, _rejected: &SecretString) -> Result<SecretString, AuthError> {
        Err(AuthError::NoRefreshToken)
    }
}

/// Offline-session tokens with single-flight refresh.
pub struct SessionTokenProvider<S, R> {
    store: S,
    refresher: R,
    refresh_lock: Mutex<()>,
}

impl<S: SessionStore, R: TokenRefresher> SessionTokenProvider<S, R> {
    #[must_use]
    pub fn new(store: S, refresher: R) -> Self {
        Self {
            store,
            refresher,
            refresh_lock: Mutex::new(()),
        }
    }

    async fn load(&self, shop: &str) -> Result<StoredSession, AuthError> {
        let session_id = offline_session_id(shop);
        self.store
            .load(&session_id)
            .await?
            .ok_or_else(|| AuthError::MissingSession {
                shop: shop.to_string(),
                session_id,
            })
    }

    /// Refresh and persist. Callers hold `refresh_lock`.
    async fn refresh_session(&self, session: StoredSession) -> Result<SecretString, AuthError> {
        let refresh_token = session
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        if session
            .refresh_token_expires
            .is_some_and(|expires| expires < Utc::now())
        {
            warn!(shop = %session.shop, "Refresh token has expired, attempting refresh anyway");
        }

        info!(shop = %session.shop, "Access token expired, refreshing");
        let token = self.refresher.refresh(&session.shop, &refresh_token).await?;
        let updated = session.with_refreshed(token, Utc::now());
        self.store.save(&updated).await?;

        if let Some(expires) = updated.expires {
            info!(shop = %updated.shop, expires = %expires.to_rfc3339(), "Token refreshed");
        }
        Ok(updated.access_token)
    }
}

#[async_trait]
impl<S: SessionStore, R: TokenRefresher> TokenProvider for SessionTokenProvider<S, R> {
    #[instrument(skip(self))]
    async fn access_token(&self, shop: &str) -> Result<SecretString, AuthError> {
        let session = self.load(shop).await?;
        if !session.is_expired(Utc::now()) {
            return Ok(session.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let session = self.load(shop).await?;
        if !session.is_expired(Utc::now()) {
            return Ok(session.access_token);
        }
        self.refresh_session(session).await
    }

    #[instrument(skip(self, rejected))]
    async fn refresh(&self, shop: &str, rejected: &SecretString) -> Result<SecretString, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let session = self.load(shop).await?;
        if session.access_token.expose_secret() != rejected.expose_secret() {
            return Ok(session.access_token);
        }
        self.refresh_session(session).await
    }
}
