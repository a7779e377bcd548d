use serde::Deserialize;

use crate::error::BackfillError;

/// Largest page the Identity Toolkit `accounts:batchGet` endpoint returns.
pub const MAX_PAGE_SIZE: u32 = 1000;

const DRY_RUN_FLAG: &str = "--dry-run";

fn default_profile_collection() -> String {
    "users".into()
}
fn default_firestore_database() -> String {
    "(default)".into()
}
fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Fallback path to the service account key when no `.json` argument is given.
    pub google_application_credentials: Option<String>,
    /// Overrides the `project_id` of the service account key.
    pub google_cloud_project: Option<String>,
    #[serde(default = "default_profile_collection")]
    pub profile_collection: String,
    #[serde(default = "default_firestore_database")]
    pub firestore_database: String,
    #[serde(rename = "backfill_page_size", default = "default_page_size")]
    pub page_size: u32,
    /// `host:port` of a running Auth emulator.
    pub firebase_auth_emulator_host: Option<String>,
    /// `host:port` of a running Firestore emulator.
    pub firestore_emulator_host: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, BackfillError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env::<Config>()?.normalized())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, BackfillError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter::<_, Config>(vars)?.normalized())
    }

    /// Empty variables count as unset, and the page size is clamped to what
    /// the listing API accepts.
    fn normalized(mut self) -> Self {
        for value in [
            &mut self.google_application_credentials,
            &mut self.google_cloud_project,
            &mut self.firebase_auth_emulator_host,
            &mut self.firestore_emulator_host,
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *value = None;
            }
        }
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }
}

/// The two inputs taken from the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    pub credentials_arg: Option<String>,
    pub dry_run: bool,
}

impl Invocation {
    /// Parse arguments, excluding the program name. The first argument ending
    /// in `.json` is the key path; `--dry-run` may appear anywhere.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut invocation = Invocation::default();
        for arg in args {
            if arg == DRY_RUN_FLAG {
                invocation.dry_run = true;
            } else if invocation.credentials_arg.is_none() && arg.ends_with(".json") {
                invocation.credentials_arg = Some(arg);
            }
        }
        invocation
    }
}
