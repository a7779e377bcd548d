use std::fmt;

use futures_util::TryStreamExt;

use crate::config::MAX_PAGE_SIZE;
use crate::error::BackfillError;
use crate::firestore::{FieldValue, ProfileFields, ProfileStore};
use crate::identity::{Account, AccountDirectory, account_pages};

pub const IS_PRO: &str = "isPro";
pub const DAILY_USAGE: &str = "dailyUsage";
pub const TOTAL_USAGE: &str = "totalUsage";
pub const PROFILE_ID: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub dry_run: bool,
    pub page_size: u32,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillProfilesStats {
    pub total_users: u64,
    pub updated_users: u64,
    pub dry_run: bool,
}

impl fmt::Display for BackfillProfilesStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[done] totalUsers={} updatedUsers={} dryRun={}",
            self.total_users, self.updated_users, self.dry_run
        )
    }
}

/// Defaults for every required profile field whose key is absent. A missing
/// document is treated as having no keys at all. Presence is checked by key
/// only, so stored `0`, `false` or `""` values are left alone.
pub fn missing_profile_fields(account: &Account, existing: Option<&ProfileFields>) -> ProfileFields {
    let has = |key: &str| existing.is_some_and(|fields| fields.contains_key(key));

    let mut updates = ProfileFields::new();
    if !has(IS_PRO) {
        updates.insert(IS_PRO.into(), FieldValue::Boolean(false));
    }
    if !has(DAILY_USAGE) {
        updates.insert(DAILY_USAGE.into(), FieldValue::Integer(0));
    }
    if !has(TOTAL_USAGE) {
        updates.insert(TOTAL_USAGE.into(), FieldValue::Integer(0));
    }
    if !has(PROFILE_ID) {
        let id = account.email.clone().unwrap_or_default();
        updates.insert(PROFILE_ID.into(), FieldValue::String(id));
    }
    updates
}

/// Walk every account and fill in the required profile fields it lacks.
///
/// Accounts are handled one at a time. In dry-run mode nothing is written but
/// `updated_users` still counts the profiles that would have been touched.
/// The first failed call aborts the run.
pub async fn backfill_profiles<D, S>(
    directory: &D,
    store: &S,
    options: BackfillOptions,
) -> Result<BackfillProfilesStats, BackfillError>
where
    D: AccountDirectory + ?Sized,
    S: ProfileStore + ?Sized,
{
    let mut stats = BackfillProfilesStats {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let mut pages = std::pin::pin!(account_pages(directory, options.page_size));
    while let Some(batch) = pages.try_next().await? {
        tracing::debug!(
            accounts = batch.len(),
            seen = stats.total_users,
            "Fetched account page"
        );
        stats.total_users += batch.len() as u64;

        for account in batch {
            let existing = store.get_profile(&account.uid).await?;
            let updates = missing_profile_fields(&account, existing.as_ref());
            if updates.is_empty() {
                continue;
            }

            let missing: Vec<&str> = updates.keys().map(String::as_str).collect();
            tracing::debug!(
                uid = %account.uid,
                created = existing.is_none(),
                fields = ?missing,
                dry_run = options.dry_run,
                "Profile is missing defaults"
            );
            if !options.dry_run {
                store.merge_profile(&account.uid, &updates).await?;
            }
            stats.updated_users += 1;
        }
    }

    Ok(stats)
}
