use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::value::{FieldValue, encode_fields};
use super::{ProfileFields, ProfileStore};
use crate::auth::TokenSource;
use crate::error::BackfillError;

pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";

const SERVICE: &str = "firestore";

#[derive(Deserialize)]
struct DocumentResponse {
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Firestore v1 REST client scoped to a single collection.
pub struct FirestoreClient {
    http: reqwest::Client,
    tokens: Arc<TokenSource>,
    documents_url: Url,
    collection: String,
}

impl FirestoreClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<TokenSource>,
        base_url: &str,
        project_id: &str,
        database: &str,
        collection: impl Into<String>,
    ) -> Result<Self, BackfillError> {
        let raw = format!(
            "{}/v1/projects/{project_id}/databases/{database}/documents",
            base_url.trim_end_matches('/')
        );
        let documents_url = Url::parse(&raw)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(BackfillError::InvalidEndpoint { url: raw })?;

        Ok(Self {
            http,
            tokens,
            documents_url,
            collection: collection.into(),
        })
    }

    pub fn document_url(&self, uid: &str) -> Result<Url, BackfillError> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackfillError::InvalidEndpoint {
                url: self.documents_url.to_string(),
            })?
            .pop_if_empty()
            .extend(self.collection.split('/').filter(|s| !s.is_empty()))
            .push(uid);
        Ok(url)
    }

    fn document_name(&self, uid: &str) -> String {
        format!("{}/{uid}", self.collection)
    }
}

#[async_trait]
impl ProfileStore for FirestoreClient {
    async fn get_profile(&self, uid: &str) -> Result<Option<ProfileFields>, BackfillError> {
        let response = self
            .http
            .get(self.document_url(uid)?)
            .bearer_auth(self.tokens.bearer().await?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackfillError::from_response(SERVICE, response).await);
        }

        let document: DocumentResponse = response.json().await?;
        let mut fields = ProfileFields::new();
        for (name, encoded) in &document.fields {
            let value = FieldValue::from_firestore(encoded).map_err(|reason| {
                BackfillError::MalformedDocument {
                    name: self.document_name(uid),
                    reason: format!("field {name}: {reason}"),
                }
            })?;
            fields.insert(name.clone(), value);
        }
        Ok(Some(fields))
    }

    async fn merge_profile(&self, uid: &str, fields: &ProfileFields) -> Result<(), BackfillError> {
        let mask: Vec<(&str, Cow<'_, str>)> = fields
            .keys()
            .map(|name| ("updateMask.fieldPaths", quote_field_path(name)))
            .collect();
        let body = serde_json::json!({ "fields": encode_fields(fields) });

        let response = self
            .http
            .patch(self.document_url(uid)?)
            .bearer_auth(self.tokens.bearer().await?)
            .query(&mask)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackfillError::from_response(SERVICE, response).await);
        }
        Ok(())
    }
}

/// Field paths that are not plain identifiers must be backtick-quoted.
pub fn quote_field_path(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        Cow::Borrowed(name)
    } else {
        let escaped = name.replace('\\', "\\\\").replace('`', "\\`");
        Cow::Owned(format!("`{escaped}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOC_PATH: &str = "/v1/projects/demo/databases/(default)/documents/users/u1";

    fn client(server: &MockServer) -> FirestoreClient {
        FirestoreClient::new(
            reqwest::Client::new(),
            Arc::new(TokenSource::Emulator),
            &server.uri(),
            "demo",
            "(default)",
            "users",
        )
        .unwrap()
    }

    #[test]
    fn test_quote_field_path() {
        assert_eq!(quote_field_path("isPro"), "isPro");
        assert_eq!(quote_field_path("_private1"), "_private1");
        assert_eq!(quote_field_path("1st"), "`1st`");
        assert_eq!(quote_field_path("has space"), "`has space`");
        assert_eq!(quote_field_path("a`b"), "`a\\`b`");
    }

    #[test]
    fn test_document_url_encodes_uid() {
        let client = FirestoreClient::new(
            reqwest::Client::new(),
            Arc::new(TokenSource::Emulator),
            "https://firestore.googleapis.com/",
            "demo",
            "(default)",
            "tenants/acme/users",
        )
        .unwrap();
        let url = client.document_url("weird/uid").unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents/tenants/acme/users/weird%2Fuid"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let result = FirestoreClient::new(
            reqwest::Client::new(),
            Arc::new(TokenSource::Emulator),
            "not a url",
            "demo",
            "(default)",
            "users",
        );
        assert!(matches!(result, Err(BackfillError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn test_get_missing_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": 404, "message": "Document not found", "status": "NOT_FOUND"}
            })))
            .mount(&server)
            .await;

        assert!(client(&server).get_profile("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_decodes_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .and(header("authorization", "Bearer owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/users/u1",
                "fields": {
                    "isPro": {"booleanValue": true},
                    "dailyUsage": {"integerValue": "0"},
                    "lastSeen": {"timestampValue": "2024-05-01T10:00:00Z"}
                },
                "createTime": "2024-01-01T00:00:00Z",
                "updateTime": "2024-05-01T10:00:00Z"
            })))
            .mount(&server)
            .await;

        let fields = client(&server).get_profile("u1").await.unwrap().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields["isPro"], FieldValue::Boolean(true));
        assert_eq!(fields["dailyUsage"], FieldValue::Integer(0));
        assert!(matches!(fields["lastSeen"], FieldValue::Other(_)));
    }

    #[tokio::test]
    async fn test_get_document_without_fields_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/users/u1"
            })))
            .mount(&server)
            .await;

        let fields = client(&server).get_profile("u1").await.unwrap();
        assert_eq!(fields, Some(ProfileFields::new()));
    }

    #[tokio::test]
    async fn test_get_malformed_field_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "fields": {"dailyUsage": {"integerValue": "lots"}}
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_profile("u1").await.unwrap_err();
        match err {
            BackfillError::MalformedDocument { name, reason } => {
                assert_eq!(name, "users/u1");
                assert!(reason.starts_with("field dailyUsage"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_permission_denied_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": 403,
                    "message": "Missing or insufficient permissions.",
                    "status": "PERMISSION_DENIED"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_profile("u1").await.unwrap_err();
        match err {
            BackfillError::Api {
                service,
                status,
                message,
            } => {
                assert_eq!(service, "firestore");
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(message.contains("PERMISSION_DENIED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_merge_sends_mask_and_fields() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .and(query_param("updateMask.fieldPaths", "dailyUsage"))
            .and(query_param("updateMask.fieldPaths", "id"))
            .and(body_json(json!({
                "fields": {
                    "dailyUsage": {"integerValue": "0"},
                    "id": {"stringValue": "a@b.com"}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/demo/databases/(default)/documents/users/u1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut fields = ProfileFields::new();
        fields.insert("dailyUsage".into(), FieldValue::Integer(0));
        fields.insert("id".into(), FieldValue::String("a@b.com".into()));

        client(&server).merge_profile("u1", &fields).await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_failure_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path(DOC_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut fields = ProfileFields::new();
        fields.insert("isPro".into(), FieldValue::Boolean(false));

        let err = client(&server).merge_profile("u1", &fields).await.unwrap_err();
        assert!(matches!(err, BackfillError::Api { status, .. } if status.is_server_error()));
    }
}
