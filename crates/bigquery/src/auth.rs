//! Service-account authentication.
//!
//! A service-account key signs a short-lived RS256 JWT assertion, which the
//! token endpoint exchanges for a bearer access token. Tokens are cached and
//! refreshed shortly before they expire.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ApiError, BigQueryError};

/// OAuth scope granting full BigQuery access.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion (the endpoint caps it at one hour).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are treated as expired this long before their real expiry.
const REFRESH_MARGIN_SECS: i64 = 60;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// ── ServiceAccountKey ────────────────────────────────────────────

/// The JSON key file downloaded for a service account.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Read and validate a key file.
    pub fn from_file(path: &Path) -> Result<Self, BigQueryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BigQueryError::Auth(format!("cannot read credentials {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BigQueryError> {
        let key: Self = serde_json::from_str(raw)
            .map_err(|e| BigQueryError::Auth(format!("malformed service account key: {e}")))?;

        if let Some(kind) = key.key_type.as_deref() {
            if kind != "service_account" {
                return Err(BigQueryError::Auth(format!(
                    "expected a service_account key, got '{kind}'"
                )));
            }
        }
        if key.client_email.is_empty() {
            return Err(BigQueryError::Auth("key has no client_email".into()));
        }
        if key.private_key.is_empty() {
            return Err(BigQueryError::Auth("key has no private_key".into()));
        }
        Ok(key)
    }

    /// Signed assertion for the token exchange, issued at `issued_at`.
    pub fn assertion(&self, issued_at: DateTime<Utc>) -> Result<String, ApiError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: BIGQUERY_SCOPE,
            aud: &self.token_uri,
            iat: issued_at.timestamp(),
            exp: issued_at.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| ApiError::Auth(format!("invalid private key: {e}")))?;

        encode(&header, &claims, &key).map_err(|e| ApiError::Auth(format!("signing failed: {e}")))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

// ── TokenProvider ────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) < self.expires_at
    }
}

/// Hands out bearer tokens for one service account, exchanging a new
/// assertion only when the cached token is about to expire.
pub struct TokenProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Self {
        info!(client_email = %key.client_email, "Token provider initialised");
        Self {
            http,
            key,
            cached: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// A valid access token, refreshed if needed.
    pub async fn access_token(&self) -> Result<String, ApiError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.exchange(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, ApiError> {
        let assertion = self.key.assertion(now)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!(
                "token endpoint returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = serde_json::from_str(&response.text().await?)?;
        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        debug!(expires_in = lifetime, "Access token refreshed");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(lifetime),
        })
    }
}
