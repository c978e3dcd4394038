//! Single-record CRUD primitives with revision bookkeeping.

use std::sync::Arc;

use couch_client::{
    is_design_doc_id, CouchError, Document, ListOptions, Result, WriteResult, ID_FIELD, REV_FIELD,
};
use serde_json::Value;

use crate::connection::ConnectionManager;

/// Identifier and revision produced by a write.
pub type IdRev = (String, String);

/// CRUD against the active connection. Every call connects on demand.
pub struct RecordAccessor {
    manager: Arc<ConnectionManager>,
}

impl RecordAccessor {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Store `record` under an identifier chosen by the server.
    pub async fn insert_without_id(&self, mut record: Document) -> Result<IdRev> {
        record.remove(ID_FIELD);
        let conn = self.manager.connect().await?;
        let res = conn.db().insert(&record, None).await?;
        Ok((res.id, res.rev))
    }

    /// Store `record` at `id`.
    ///
    /// Without a matching `_rev` in `record` this fails with `Conflict`
    /// when a document already exists at `id`.
    pub async fn insert_with_id(&self, id: &str, mut record: Document) -> Result<IdRev> {
        record.remove(ID_FIELD);
        let conn = self.manager.connect().await?;
        let res = conn.db().insert(&record, Some(id)).await?;
        Ok((id.to_string(), res.rev))
    }

    /// Overwrite the document at `id`, filling in its current revision
    /// when `record` carries none.
    pub async fn update_with_id(&self, id: &str, record: Document) -> Result<IdRev> {
        let record = self.ensure_rev(id, record).await?;
        self.insert_with_id(id, record).await
    }

    /// Attach the stored revision of `id` unless `record` already has one.
    pub async fn ensure_rev(&self, id: &str, mut record: Document) -> Result<Document> {
        if record.get(REV_FIELD).is_some_and(|rev| !rev.is_null()) {
            return Ok(record);
        }
        let current = self.fetch_by_id(id).await?;
        if let Some(rev) = current.get(REV_FIELD) {
            record.insert(REV_FIELD.to_string(), rev.clone());
        }
        Ok(record)
    }

    /// Delete the current revision of `id`.
    ///
    /// `NotFound` when the document is absent; `Conflict` when it changed
    /// between the fetch and the delete.
    pub async fn try_delete_by_id(&self, id: &str) -> Result<WriteResult> {
        let current = self.fetch_by_id(id).await?;
        let rev = current
            .get(REV_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| CouchError::Transport(format!("Document '{id}' has no revision")))?
            .to_string();
        let conn = self.manager.connect().await?;
        conn.db().destroy(id, &rev).await
    }

    /// Boolean form of `try_delete_by_id`: `false` when nothing was deleted.
    pub async fn delete_by_id(&self, id: &str) -> bool {
        match self.try_delete_by_id(id).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!("Failed to delete document '{}': {}", id, e);
                false
            }
        }
    }

    /// Fetch the document at `id`; an empty body counts as `NotFound`.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Document> {
        let conn = self.manager.connect().await?;
        match conn.db().get(id).await? {
            Value::Object(doc) => Ok(doc),
            Value::Null => Err(CouchError::NotFound(format!("Document '{id}' not found"))),
            other => Err(CouchError::Transport(format!(
                "Unexpected body for document '{id}': {other}"
            ))),
        }
    }

    /// Every non-design document as `(id, document)` pairs, in store order.
    pub async fn list_all(&self) -> Result<Vec<(String, Document)>> {
        let conn = self.manager.connect().await?;
        let response = conn.db().list(ListOptions { include_docs: true }).await?;
        Ok(response
            .rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id?;
                if is_design_doc_id(&id) {
                    return None;
                }
                Some((id, row.doc.unwrap_or_default()))
            })
            .collect())
    }
}
