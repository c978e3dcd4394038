//! CouchDB HTTP implementation of the store traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CouchError, Result};
use crate::traits::{CouchDatabase, CouchServer};
use crate::types::{
    DatabaseInfo, Document, ListOptions, RowsResponse, ViewQuery, WriteResult, DESIGN_PREFIX,
};

/// Transport options applied to every request.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout; `None` keeps reqwest's default (no timeout).
    pub timeout: Option<Duration>,
}

struct HttpInner {
    base: Url,
    client: reqwest::Client,
    username: Option<String>,
    password: Option<String>,
}

/// CouchDB server reached over HTTP.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct HttpServer {
    inner: Arc<HttpInner>,
}

impl HttpServer {
    /// Create a client for the server at `url` (e.g. `http://127.0.0.1:5984`).
    pub fn new(url: &str, opts: ClientOptions) -> Result<Self> {
        let base = Url::parse(url)
            .map_err(|e| CouchError::Configuration(format!("Invalid CouchDB URL '{url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CouchError::Configuration(format!(
                "CouchDB URL '{url}' cannot be used as a base URL"
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = opts.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            inner: Arc::new(HttpInner {
                base,
                client,
                username: opts.username,
                password: opts.password,
            }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base
    }
}

impl HttpInner {
    /// Base URL with `segments` appended, each percent-encoded as one segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        read_json(response).await
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    reason: Option<String>,
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        return Err(CouchError::from_status(
            status.as_u16(),
            body.error,
            body.reason,
        ));
    }
    Ok(response.json::<T>().await?)
}

/// Path segments for a document identifier.
///
/// Design-document identifiers keep their namespace as a separate segment
/// so the slash is not percent-encoded.
fn doc_segments<'a>(db: &'a str, id: &'a str) -> Vec<&'a str> {
    match id.strip_prefix(DESIGN_PREFIX) {
        Some(name) => vec![db, "_design", name],
        None => vec![db, id],
    }
}

#[async_trait]
impl CouchServer for HttpServer {
    async fn ping(&self) -> Result<Value> {
        let url = self.inner.endpoint(&[]);
        self.inner.send(self.inner.request(Method::GET, url)).await
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let url = self.inner.endpoint(&[name]);
        let _: Value = self.inner.send(self.inner.request(Method::PUT, url)).await?;
        Ok(())
    }

    async fn destroy_database(&self, name: &str) -> Result<()> {
        let url = self.inner.endpoint(&[name]);
        let _: Value = self
            .inner
            .send(self.inner.request(Method::DELETE, url))
            .await?;
        Ok(())
    }

    async fn database_info(&self, name: &str) -> Result<DatabaseInfo> {
        let url = self.inner.endpoint(&[name]);
        self.inner.send(self.inner.request(Method::GET, url)).await
    }

    fn use_database(&self, name: &str) -> Arc<dyn CouchDatabase> {
        Arc::new(HttpDatabase {
            inner: self.inner.clone(),
            name: name.to_string(),
        })
    }
}

/// Handle to one database on an `HttpServer`.
pub struct HttpDatabase {
    inner: Arc<HttpInner>,
    name: String,
}

#[async_trait]
impl CouchDatabase for HttpDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Value> {
        let url = self.inner.endpoint(&doc_segments(&self.name, id));
        self.inner.send(self.inner.request(Method::GET, url)).await
    }

    async fn insert(&self, doc: &Document, target_id: Option<&str>) -> Result<WriteResult> {
        let builder = match target_id {
            Some(id) => {
                let url = self.inner.endpoint(&doc_segments(&self.name, id));
                self.inner.request(Method::PUT, url)
            }
            None => {
                let url = self.inner.endpoint(&[&self.name]);
                self.inner.request(Method::POST, url)
            }
        };
        self.inner.send(builder.json(doc)).await
    }

    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResult> {
        let mut url = self.inner.endpoint(&doc_segments(&self.name, id));
        url.query_pairs_mut().append_pair("rev", rev);
        self.inner
            .send(self.inner.request(Method::DELETE, url))
            .await
    }

    async fn list(&self, opts: ListOptions) -> Result<RowsResponse> {
        let mut url = self.inner.endpoint(&[&self.name, "_all_docs"]);
        if opts.include_docs {
            url.query_pairs_mut().append_pair("include_docs", "true");
        }
        self.inner.send(self.inner.request(Method::GET, url)).await
    }

    async fn view(&self, design: &str, view: &str, query: &ViewQuery) -> Result<RowsResponse> {
        let url = self
            .inner
            .endpoint(&[&self.name, "_design", design, "_view", view]);
        let builder = match &query.keys {
            Some(_) => self.inner.request(Method::POST, url).json(query),
            None => self.inner.request(Method::GET, url),
        };
        self.inner.send(builder).await
    }
}
