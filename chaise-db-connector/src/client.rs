//! HTTP transport for the document store's wire protocol.
//!
//! [`Database`] is a thin typed wrapper over the store endpoints the
//! adapter consumes: `_find`, `_index`, `_bulk_docs`, document CRUD, and
//! design-document views. It maps status codes onto the connector error
//! taxonomy and nothing more; pagination, planning, and mapping live
//! above it.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::{ConnectorError, Result};

/// Body of a `_find` request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FindQuery {
    pub selector: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

/// Body of a `_find` response. `docs` stays optional here: its absence is a
/// protocol violation the executor reports with query context attached.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Option<Vec<JsonValue>>,
    pub bookmark: Option<String>,
}

/// Result of a single-document write.
#[derive(Debug, Deserialize)]
pub struct DocumentResult {
    pub id: String,
    pub rev: String,
    #[serde(default)]
    pub ok: bool,
}

/// One entry of a `_bulk_docs` response.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkResult {
    pub id: Option<String>,
    pub rev: Option<String>,
    pub ok: Option<bool>,
    pub error: Option<String>,
    pub reason: Option<String>,
}

/// Body of an `_index` creation request.
#[derive(Debug, Serialize)]
pub struct CreateIndexRequest {
    pub index: IndexFieldsBody,
    pub ddoc: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct IndexFieldsBody {
    pub fields: Vec<JsonValue>,
}

/// Body of the `_index` listing response.
#[derive(Debug, Deserialize)]
pub struct IndexListResponse {
    #[serde(default)]
    pub indexes: Vec<RawIndex>,
    pub total_rows: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawIndex {
    /// `None` for the built-in all-docs index
    pub ddoc: Option<String>,
    pub name: String,
    pub def: RawIndexDef,
}

#[derive(Debug, Deserialize)]
pub struct RawIndexDef {
    #[serde(default)]
    pub fields: Vec<JsonValue>,
}

/// Parameters of a design-document view query.
#[derive(Debug, Clone, Default)]
pub struct ViewParams {
    /// Exact-match key filter
    pub key: Option<JsonValue>,
    pub include_docs: Option<bool>,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
    pub descending: Option<bool>,
}

impl ViewParams {
    pub fn with_key(key: JsonValue) -> Self {
        ViewParams {
            key: Some(key),
            ..Default::default()
        }
    }
}

/// Body of a view response.
#[derive(Debug, Deserialize)]
pub struct ViewResponse {
    pub total_rows: Option<u64>,
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<ViewRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewRow {
    pub id: Option<String>,
    pub key: JsonValue,
    pub value: JsonValue,
}

/// Handle on one database of the store.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    server_url: String,
    name: String,
    auth: Option<(String, String)>,
}

impl Database {
    pub fn new(
        client: Client,
        server_url: impl Into<String>,
        name: impl Into<String>,
        auth: Option<(String, String)>,
    ) -> Self {
        Database {
            client,
            server_url: server_url.into(),
            name: name.into(),
            auth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/{}", self.server_url, self.name)
        } else {
            format!("{}/{}/{}", self.server_url, self.name, path)
        }
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some((user, pass)) = &self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    /// POST `/{db}/_find`.
    pub async fn find(&self, query: &FindQuery) -> Result<FindResponse> {
        let response = self
            .request(Method::POST, self.url("_find"))
            .json(query)
            .send()
            .await?;
        let response = check(response, "find").await?;
        Ok(response.json().await?)
    }

    /// GET `/{db}/{id}`; 404 is an absent document, not an error.
    pub async fn get(&self, id: &str) -> Result<Option<JsonValue>> {
        let response = self.request(Method::GET, self.url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, "get").await?;
        Ok(Some(response.json().await?))
    }

    /// HEAD `/{db}/{id}`, returning the current revision from the ETag.
    pub async fn head_rev(&self, id: &str) -> Result<Option<String>> {
        let response = self.request(Method::HEAD, self.url(id)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response, "head").await?;
        let rev = response
            .headers()
            .get("etag")
            .and_then(|value| value.to_str().ok())
            .map(|etag| etag.trim_matches('"').to_string());
        Ok(rev)
    }

    /// POST `/{db}`: write one document. The store rejects a write whose
    /// revision token does not match the current stored revision.
    pub async fn insert(&self, doc: &JsonValue) -> Result<DocumentResult> {
        let response = self
            .request(Method::POST, self.url(""))
            .json(doc)
            .send()
            .await?;
        let response = check(response, "insert").await?;
        Ok(response.json().await?)
    }

    /// DELETE `/{db}/{id}?rev=...`.
    pub async fn delete(&self, id: &str, rev: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, self.url(id))
            .query(&[("rev", rev)])
            .send()
            .await?;
        check(response, "delete").await?;
        Ok(())
    }

    /// POST `/{db}/_bulk_docs`: one status entry per submitted document.
    pub async fn bulk(&self, docs: &[JsonValue]) -> Result<Vec<BulkResult>> {
        let response = self
            .request(Method::POST, self.url("_bulk_docs"))
            .json(&json!({ "docs": docs }))
            .send()
            .await?;
        let response = check(response, "bulk").await?;
        Ok(response.json().await?)
    }

    /// POST `/{db}/_index`.
    pub async fn create_index(&self, request: &CreateIndexRequest) -> Result<()> {
        let response = self
            .request(Method::POST, self.url("_index"))
            .json(request)
            .send()
            .await?;
        check(response, "create index").await?;
        Ok(())
    }

    /// GET `/{db}/_index`: every index of the database, all models mixed.
    pub async fn list_indexes(&self) -> Result<IndexListResponse> {
        let response = self.request(Method::GET, self.url("_index")).send().await?;
        let response = check(response, "list indexes").await?;
        Ok(response.json().await?)
    }

    /// GET `/{db}/_design/{ddoc}/_view/{view}`.
    pub async fn view(&self, ddoc: &str, view: &str, params: &ViewParams) -> Result<ViewResponse> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(key) = &params.key {
            query.push(("key", serde_json::to_string(key)?));
        }
        if let Some(include_docs) = params.include_docs {
            query.push(("include_docs", include_docs.to_string()));
        }
        if let Some(limit) = params.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(skip) = params.skip {
            query.push(("skip", skip.to_string()));
        }
        if let Some(descending) = params.descending {
            query.push(("descending", descending.to_string()));
        }
        let url = self.url(&format!("_design/{ddoc}/_view/{view}"));
        let response = self
            .request(Method::GET, url)
            .query(&query)
            .send()
            .await?;
        let response = check(response, "view").await?;
        Ok(response.json().await?)
    }

    /// GET `/{db}`: whether the database exists.
    pub async fn exists(&self) -> Result<bool> {
        let response = self.request(Method::GET, self.url("")).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response, "database info").await?;
        Ok(true)
    }

    /// GET `/_all_dbs` at the server root.
    pub async fn all_dbs(&self) -> Result<Vec<String>> {
        let response = self
            .request(Method::GET, format!("{}/_all_dbs", self.server_url))
            .send()
            .await?;
        let response = check(response, "all dbs").await?;
        Ok(response.json().await?)
    }
}

/// Map a non-success status onto the error taxonomy; success passes the
/// response through for body handling.
async fn check(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => ConnectorError::not_found(format!("{context}: {message}")),
        StatusCode::CONFLICT => ConnectorError::conflict(format!("{context}: {message}")),
        _ => ConnectorError::Http {
            status: status.as_u16(),
            message: format!("{context}: {message}"),
        },
    })
}
