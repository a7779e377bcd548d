use std::sync::Arc;

use crate::auth::{ServiceAccountTokens, TokenSource};
use crate::config::Config;
use crate::credentials::ServiceAccount;
use crate::error::BackfillError;
use crate::firestore::FirestoreClient;
use crate::firestore::rest::FIRESTORE_BASE_URL;
use crate::identity::{IDENTITY_TOOLKIT_BASE_URL, IdentityToolkitClient};

/// The two capabilities a backfill run needs, built once and passed down.
pub struct FirebaseClients {
    pub project_id: String,
    pub accounts: IdentityToolkitClient,
    pub profiles: FirestoreClient,
}

impl FirebaseClients {
    pub fn new(config: &Config, account: ServiceAccount) -> Result<Self, BackfillError> {
        let http = reqwest::Client::new();
        let project_id = config
            .google_cloud_project
            .clone()
            .unwrap_or_else(|| account.project_id.clone());

        let needs_service_account =
            config.firebase_auth_emulator_host.is_none() || config.firestore_emulator_host.is_none();
        let service_tokens = if needs_service_account {
            Some(Arc::new(TokenSource::ServiceAccount(
                ServiceAccountTokens::new(http.clone(), account)?,
            )))
        } else {
            None
        };
        let tokens_for = |emulated: bool| match (&service_tokens, emulated) {
            (Some(tokens), false) => Arc::clone(tokens),
            _ => Arc::new(TokenSource::Emulator),
        };

        let auth_base = match &config.firebase_auth_emulator_host {
            Some(host) => format!("http://{host}/identitytoolkit.googleapis.com"),
            None => IDENTITY_TOOLKIT_BASE_URL.to_string(),
        };
        let auth_tokens = tokens_for(config.firebase_auth_emulator_host.is_some());

        let firestore_base = match &config.firestore_emulator_host {
            Some(host) => format!("http://{host}"),
            None => FIRESTORE_BASE_URL.to_string(),
        };
        let firestore_tokens = tokens_for(config.firestore_emulator_host.is_some());

        tracing::info!(
            project_id = %project_id,
            collection = %config.profile_collection,
            auth_endpoint = %auth_base,
            firestore_endpoint = %firestore_base,
            "Configured Firebase clients"
        );

        let accounts =
            IdentityToolkitClient::new(http.clone(), auth_tokens, &auth_base, &project_id);
        let profiles = FirestoreClient::new(
            http,
            firestore_tokens,
            &firestore_base,
            &project_id,
            &config.firestore_database,
            config.profile_collection.clone(),
        )?;

        Ok(Self {
            project_id,
            accounts,
            profiles,
        })
    }
}
