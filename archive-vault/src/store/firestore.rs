//! Hosted document database client (REST)
//!
//! Creates go through `documents:commit` so the server stamps `createdAt`
//! with its request time. The REST surface has no push channel, so the
//! listener re-reads the scope on a fixed cadence and only yields when the
//! record set actually changed.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use archive_common::config::VaultConfig;
use archive_common::{time, Error, NewRecord, Record, RecordId, Result, ScopePath};

use super::{DocumentStore, RecordSetStream};
use crate::identity::TokenSource;

const API_ROOT: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: u32 = 300;
const USER_AGENT: &str = concat!("cyber-archive/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    error: StoreError,
}

#[derive(Debug, Deserialize)]
struct StoreError {
    message: String,
}

struct FirestoreClient {
    http_client: reqwest::Client,
    /// `projects/{p}/databases/(default)/documents`
    root: String,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
}

/// Document store backed by the hosted database's REST API
#[derive(Clone)]
pub struct FirestoreStore {
    inner: Arc<FirestoreClient>,
}

impl FirestoreStore {
    pub fn new(config: &VaultConfig, tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let project = config.project_id.as_deref().ok_or_else(|| {
            Error::Config("project_id is required for firestore backend".to_string())
        })?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(FirestoreClient {
                http_client,
                root: documents_root(project),
                tokens,
                poll_interval: Duration::from_millis(config.poll_interval_ms.max(250)),
            }),
        })
    }
}

impl FirestoreClient {
    fn url(&self, suffix: &str) -> String {
        format!("{}/{}{}", API_ROOT, self.root, suffix)
    }

    async fn authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        Ok(match self.tokens.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn list(&self, scope: &ScopePath) -> Result<Vec<Record>> {
        let url = self.url(&format!("/{}", scope));
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(&url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self
                .authorized(request)
                .await?
                .send()
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;
            let page: ListResponse = parse_response(response).await?;

            for doc in &page.documents {
                match document_to_record(doc) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping malformed document {}: {}", doc.name, e),
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn subscribe(&self, scope: &ScopePath) -> Result<RecordSetStream> {
        let initial = self.inner.list(scope).await?;
        let client = Arc::clone(&self.inner);
        let scope = scope.clone();
        debug!("Store listener opened on {}", scope);

        let stream = async_stream::stream! {
            let mut last = initial.clone();
            yield Ok(initial);

            loop {
                tokio::time::sleep(client.poll_interval).await;
                match client.list(&scope).await {
                    Ok(records) => {
                        if records != last {
                            last = records.clone();
                            yield Ok(records);
                        }
                    }
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn create(&self, scope: &ScopePath, record: NewRecord) -> Result<RecordId> {
        let id = RecordId::generate();
        let body = commit_body(&self.inner.root, scope, &id, &record);

        let request = self.inner.http_client.post(self.inner.url(":commit")).json(&body);
        let response = self
            .inner
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let _: Value = parse_response(response).await?;

        debug!("Created {}", scope.document(&id));
        Ok(id)
    }

    async fn delete(&self, scope: &ScopePath, id: &RecordId) -> Result<()> {
        let request = self
            .inner
            .http_client
            .delete(self.inner.url(&format!("/{}", scope.document(id))));
        let response = self
            .inner
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        let _: Value = parse_response(response).await?;
        Ok(())
    }
}

fn documents_root(project: &str) -> String {
    format!("projects/{}/databases/(default)/documents", project)
}

/// Single-write commit creating the document and stamping `createdAt`
fn commit_body(root: &str, scope: &ScopePath, id: &RecordId, record: &NewRecord) -> Value {
    json!({
        "writes": [{
            "update": {
                "name": format!("{}/{}", root, scope.document(id)),
                "fields": {
                    "name": { "stringValue": record.name },
                    "email": { "stringValue": record.email },
                    "fileName": { "stringValue": record.file_name },
                    "fileData": { "stringValue": record.file_data },
                },
            },
            "currentDocument": { "exists": false },
            "updateTransforms": [{
                "fieldPath": "createdAt",
                "setToServerValue": "REQUEST_TIME",
            }],
        }]
    })
}

fn string_field(fields: &HashMap<String, Value>, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInput(format!("missing string field '{}'", key)))
}

fn document_to_record(doc: &RawDocument) -> Result<Record> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("bad document name '{}'", doc.name)))?;

    let created_at = match doc
        .fields
        .get("createdAt")
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
    {
        Some(raw) => Some(time::parse_rfc3339(raw)?),
        None => None,
    };

    Ok(Record {
        id: RecordId::new(id),
        name: string_field(&doc.fields, "name")?,
        email: string_field(&doc.fields, "email")?,
        file_name: string_field(&doc.fields, "fileName")?,
        file_data: string_field(&doc.fields, "fileData")?,
        created_at,
    })
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<StoreErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        return Err(Error::Transport(format!(
            "document store returned {}: {}",
            status.as_u16(),
            message
        )));
    }
    // DELETE answers with an empty object; treat an empty body the same way
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    if bytes.is_empty() {
        return serde_json::from_value(Value::Object(Map::new()))
            .map_err(|e| Error::Transport(format!("document store response: {}", e)));
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Transport(format!("document store response: {}", e)))
}
