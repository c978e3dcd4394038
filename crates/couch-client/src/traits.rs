//! Trait definitions for the document-store collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::types::{DatabaseInfo, Document, ListOptions, RowsResponse, ViewQuery, WriteResult};

/// Server-scoped operations.
///
/// Implemented over HTTP by `HttpServer`; tests use an in-memory store.
#[async_trait]
pub trait CouchServer: Send + Sync {
    /// Check that the server answers.
    async fn ping(&self) -> Result<Value>;

    async fn create_database(&self, name: &str) -> Result<()>;

    async fn destroy_database(&self, name: &str) -> Result<()>;

    /// Fetch the database descriptor; `NotFound` when the database is absent.
    async fn database_info(&self, name: &str) -> Result<DatabaseInfo>;

    /// Bind a handle to one database. Performs no network round trip.
    fn use_database(&self, name: &str) -> Arc<dyn CouchDatabase>;
}

/// Database-scoped document operations.
#[async_trait]
pub trait CouchDatabase: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a document by identifier.
    ///
    /// Returns the raw body; callers decide how to treat a `null` body.
    async fn get(&self, id: &str) -> Result<Value>;

    /// Write a document.
    ///
    /// With `target_id` the write is a PUT to that identifier; otherwise the
    /// server assigns one. A `_rev` in `doc` authorizes overwriting.
    async fn insert(&self, doc: &Document, target_id: Option<&str>) -> Result<WriteResult>;

    /// Delete the given revision of a document.
    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResult>;

    /// Enumerate documents in the store's native order.
    async fn list(&self, opts: ListOptions) -> Result<RowsResponse>;

    /// Query a view of a design document.
    async fn view(&self, design: &str, view: &str, query: &ViewQuery) -> Result<RowsResponse>;
}
