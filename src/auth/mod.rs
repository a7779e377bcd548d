use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::credentials::ServiceAccount;
use crate::error::BackfillError;

pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Scopes requested for the Admin-style access both APIs need.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/datastore",
    "https://www.googleapis.com/auth/identitytoolkit",
    "https://www.googleapis.com/auth/userinfo.email",
];

/// Bearer token the Firebase emulators accept as an admin credential.
pub const EMULATOR_TOKEN: &str = "owner";

const ASSERTION_TTL_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

/// Claims of the self-signed assertion exchanged for an access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AssertionClaims {
    /// Service account email (issuer).
    pub iss: String,
    /// Space separated OAuth scopes.
    pub scope: String,
    /// Token endpoint (audience).
    pub aud: String,
    /// Expiry time as a UTC Unix timestamp.
    pub exp: i64,
    /// Issued-at time as a UTC Unix timestamp.
    pub iat: i64,
}

/// Sign a JWT bearer assertion for `account` with its RSA private key.
pub fn create_assertion(
    account: &ServiceAccount,
    key: &EncodingKey,
    now: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: account.client_email.clone(),
        scope: SCOPES.join(" "),
        aud: account.token_uri.clone(),
        exp: iat + ASSERTION_TTL_SECS,
        iat,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = account.private_key_id.clone();
    encode(&header, &claims, key)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_TTL_SECS
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed assertions for access tokens and caches the result until
/// shortly before it expires.
pub struct ServiceAccountTokens {
    http: reqwest::Client,
    account: ServiceAccount,
    key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn new(http: reqwest::Client, account: ServiceAccount) -> Result<Self, BackfillError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
        Ok(Self {
            http,
            account,
            key,
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, BackfillError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached.as_ref()
            && token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
        {
            return Ok(token.value.clone());
        }

        let token = self.exchange(now).await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, BackfillError> {
        let assertion = create_assertion(&self.account, &self.key, now)?;
        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("assertion", &assertion)
            .finish();

        let response = self
            .http
            .post(&self.account.token_uri)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<TokenErrorResponse>(&text) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{error}: {description}"),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => text,
            };
            return Err(BackfillError::TokenExchange { status, message });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(
            client_email = %self.account.client_email,
            expires_in = token.expires_in,
            "Obtained access token"
        );
        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

/// Where a client gets its `Authorization: Bearer` value from.
pub enum TokenSource {
    ServiceAccount(ServiceAccountTokens),
    Emulator,
}

impl TokenSource {
    pub async fn bearer(&self) -> Result<String, BackfillError> {
        match self {
            TokenSource::ServiceAccount(tokens) => tokens.access_token().await,
            TokenSource::Emulator => Ok(EMULATOR_TOKEN.to_string()),
        }
    }
}
