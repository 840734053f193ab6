//! OAuth2 JWT-bearer token exchange for read-only spreadsheet access.

use std::fmt;

use async_trait::async_trait;
use campo_storage::{HttpClient, HttpError, Url};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets.readonly";
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Requested assertion lifetime. Tokens are not refreshed during a run.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no service credential configured")]
    MissingCredential,
    #[error("malformed service credential: {0}")]
    MalformedCredential(String),
    #[error("invalid service credential private key: {0}")]
    InvalidKey(String),
    #[error("signing token assertion failed: {0}")]
    Signing(String),
    #[error("invalid token endpoint {0}")]
    Endpoint(String),
    #[error("token exchange rejected: {0}")]
    Exchange(#[from] HttpError),
    #[error("token endpoint returned an empty access token")]
    EmptyToken,
}

/// Bearer token for the spreadsheet API.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn obtain_access_token(&self) -> Result<AccessToken, AuthError>;
}

/// Hands out a pre-issued token; used for local runs and tests.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(secret),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn obtain_access_token(&self) -> Result<AccessToken, AuthError> {
        Ok(self.token.clone())
    }
}

/// Service-account key file contents (the fields the exchange needs).
#[derive(Clone, Deserialize)]
pub struct ServiceCredential {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceCredential {
    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let mut credential: ServiceCredential = serde_json::from_str(raw)
            .map_err(|e| AuthError::MalformedCredential(e.to_string()))?;
        if credential.client_email.trim().is_empty() {
            return Err(AuthError::MalformedCredential("client_email is empty".into()));
        }
        if credential.private_key.trim().is_empty() {
            return Err(AuthError::MalformedCredential("private_key is empty".into()));
        }
        // Keys pasted into env vars often carry literal `\n` sequences.
        if !credential.private_key.contains('\n') {
            credential.private_key = credential.private_key.replace("\\n", "\n");
        }
        Ok(credential)
    }
}

impl fmt::Debug for ServiceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredential")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs the RS256 assertion exchanged for an access token.
pub fn sign_assertion(
    credential: &ServiceCredential,
    token_uri: &str,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let key = EncodingKey::from_rsa_pem(credential.private_key.as_bytes())
        .map_err(|e| AuthError::InvalidKey(e.to_string()))?;
    let mut header = Header::new(Algorithm::RS256);
    header.kid = credential.private_key_id.clone();

    let claims = AssertionClaims {
        iss: credential.client_email.clone(),
        scope: SHEETS_READONLY_SCOPE.to_string(),
        aud: token_uri.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::seconds(TOKEN_LIFETIME_SECS)).timestamp(),
    };

    jsonwebtoken::encode(&header, &claims, &key).map_err(|e| AuthError::Signing(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges a service credential for a bearer token on every call.
///
/// The credential is kept as raw JSON and only parsed when a run authenticates,
/// so a missing or malformed key fails that run instead of process startup.
#[derive(Debug, Clone)]
pub struct ServiceAccountTokenProvider {
    http: HttpClient,
    raw_credential: Option<String>,
    token_uri: Option<String>,
}

impl ServiceAccountTokenProvider {
    pub fn new(http: HttpClient, raw_credential: Option<String>) -> Self {
        Self {
            http,
            raw_credential,
            token_uri: None,
        }
    }

    /// Overrides the token endpoint named in the credential.
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    fn resolve_token_uri(&self, credential: &ServiceCredential) -> String {
        self.token_uri
            .clone()
            .or_else(|| credential.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string())
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountTokenProvider {
    async fn obtain_access_token(&self) -> Result<AccessToken, AuthError> {
        let raw = self
            .raw_credential
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(AuthError::MissingCredential)?;
        let credential = ServiceCredential::from_json(raw)?;
        let token_uri = self.resolve_token_uri(&credential);
        let url = Url::parse(&token_uri).map_err(|_| AuthError::Endpoint(token_uri.clone()))?;

        let now = Utc::now();
        let assertion = sign_assertion(&credential, &token_uri, now)?;
        let response: TokenResponse = self
            .http
            .post_form_json(url, &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .await?;

        if response.access_token.trim().is_empty() {
            return Err(AuthError::EmptyToken);
        }
        debug!(client_email = %credential.client_email, "exchanged service credential for access token");

        let expires_in = response.expires_in.unwrap_or(TOKEN_LIFETIME_SECS);
        Ok(AccessToken::new(response.access_token).with_expiry(now + Duration::seconds(expires_in)))
    }
}
