use std::path::PathBuf;

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum BackfillError {
    #[error(
        "service account key JSON path is required, e.g. backfill_profiles /path/to/key.json \
         or GOOGLE_APPLICATION_CREDENTIALS=/path/to/key.json"
    )]
    MissingCredentials,

    #[error("failed to read service account key {}: {source}", path.display())]
    CredentialsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key {}: {source}", path.display())]
    CredentialsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid environment configuration: {0}")]
    Config(#[from] envy::Error),

    #[error("failed to sign token assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token exchange rejected ({status}): {message}")]
    TokenExchange { status: StatusCode, message: String },

    #[error("{service} request failed ({status}): {message}")]
    Api {
        service: &'static str,
        status: StatusCode,
        message: String,
    },

    #[error("invalid endpoint url {url}")]
    InvalidEndpoint { url: String },

    #[error("malformed document {name}: {reason}")]
    MalformedDocument { name: String, reason: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl BackfillError {
    /// Drain a non-success response into an [`BackfillError::Api`], pulling the
    /// message out of Google's `{"error": {...}}` envelope when present.
    pub async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        BackfillError::Api {
            service,
            status,
            message: google_error_message(&body),
        }
    }
}

fn google_error_message(body: &str) -> String {
    match serde_json::from_str::<GoogleErrorBody>(body) {
        Ok(GoogleErrorBody { error }) => match error.status {
            Some(status) if !error.message.is_empty() => format!("{status}: {}", error.message),
            Some(status) => status,
            None => error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
