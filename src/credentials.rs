use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::BackfillError;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

/// The subset of a Google service account key file used to mint access tokens.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// Pick the key path: a `.json` argument beats the environment variable.
/// Relative paths are resolved against `cwd`.
pub fn resolve_credentials_path(
    arg_path: Option<&str>,
    env_path: Option<&str>,
    cwd: &Path,
) -> Result<PathBuf, BackfillError> {
    let raw = arg_path
        .filter(|p| !p.is_empty())
        .or(env_path.filter(|p| !p.is_empty()))
        .ok_or(BackfillError::MissingCredentials)?;

    let path = Path::new(raw);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(cwd.join(path))
    }
}

pub fn load_service_account(path: &Path) -> Result<ServiceAccount, BackfillError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BackfillError::CredentialsRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| BackfillError::CredentialsParse {
        path: path.to_path_buf(),
        source,
    })
}
