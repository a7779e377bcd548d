pub mod rest;
pub mod value;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::BackfillError;

pub use rest::FirestoreClient;
pub use value::FieldValue;

/// Field name to value mapping of a profile document.
pub type ProfileFields = BTreeMap<String, FieldValue>;

/// Read and merge-write access to the profile documents, keyed by account uid.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `None` when no document exists for `uid`.
    async fn get_profile(&self, uid: &str) -> Result<Option<ProfileFields>, BackfillError>;

    /// Set the given fields, leaving every other field untouched and creating
    /// the document when it does not exist.
    async fn merge_profile(&self, uid: &str, fields: &ProfileFields) -> Result<(), BackfillError>;
}
