use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use futures_util::stream;
use serde::Deserialize;

use crate::auth::TokenSource;
use crate::error::BackfillError;

pub const IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

const SERVICE: &str = "identitytoolkit";

/// An identity-provider user account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(rename = "localId")]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// One batch of accounts and the token for the batch after it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPage {
    #[serde(rename = "users", default)]
    pub accounts: Vec<Account>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// List at most `page_size` accounts, starting where `page_token` points
    /// or at the beginning when it is `None`.
    async fn list_accounts(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<AccountPage, BackfillError>;
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily walk every page of `directory`, following continuation tokens until
/// a page comes back without one. The stream ends after the first error.
pub fn account_pages<D>(
    directory: &D,
    page_size: u32,
) -> impl Stream<Item = Result<Vec<Account>, BackfillError>> + '_
where
    D: AccountDirectory + ?Sized,
{
    stream::try_unfold(Cursor::Start, move |cursor| async move {
        let token = match cursor {
            Cursor::Done => return Ok::<_, BackfillError>(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        let page = directory.list_accounts(page_size, token.as_deref()).await?;
        let next = match page.next_page_token {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        };
        Ok(Some((page.accounts, next)))
    })
}

/// Identity Toolkit v1 client for `accounts:batchGet`.
pub struct IdentityToolkitClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    batch_get_url: String,
}

impl IdentityToolkitClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
        base_url: &str,
        project_id: &str,
    ) -> Self {
        let batch_get_url = format!(
            "{}/v1/projects/{project_id}/accounts:batchGet",
            base_url.trim_end_matches('/')
        );
        Self {
            http,
            tokens,
            batch_get_url,
        }
    }
}

#[async_trait]
impl AccountDirectory for IdentityToolkitClient {
    async fn list_accounts(
        &self,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<AccountPage, BackfillError> {
        let mut query = vec![("maxResults", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("nextPageToken", token.to_string()));
        }

        let response = self
            .http
            .get(&self.batch_get_url)
            .bearer_auth(self.tokens.bearer().await?)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackfillError::from_response(SERVICE, response).await);
        }
        Ok(response.json().await?)
    }
}
