//! The model-layer contract and its CouchDB implementation.

use std::sync::Arc;

use async_trait::async_trait;
use couch_client::{
    CouchServer, DatabaseInfo, Document, Result, RowsResponse, ViewQuery, ID_FIELD,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::accessor::{IdRev, RecordAccessor};
use crate::config::ConnectorSettings;
use crate::connection::{Connection, ConnectionManager, Transport};
use crate::lifecycle::LifecycleController;
use crate::query::{key_to_id, WhereClause};

/// Number of records removed by a bulk delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyCount {
    pub count: usize,
}

/// Capabilities a model layer expects from a data-source connector.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<Connection>>;

    /// Always succeeds with `true`, also when not connected.
    async fn disconnect(&self) -> Result<bool>;

    async fn ping(&self) -> Result<Value>;

    /// Create the database if missing and reconcile design documents.
    async fn update(&self, models: &[String]) -> Result<DatabaseInfo>;

    /// Drop and recreate the database, then reconcile design documents.
    async fn migrate(&self, models: &[String]) -> Result<DatabaseInfo>;

    /// Insert a record. An `_id` (or `id`) in `record` targets that
    /// identifier and conflicts when it is taken.
    async fn create(&self, record: Document) -> Result<IdRev>;

    /// Upsert `record` at `id`.
    async fn save(&self, id: &str, record: Document) -> Result<IdRev>;

    async fn find_by_id(&self, id: &str) -> Result<Document>;

    /// Records for `ids`, in order; identifiers that do not exist are skipped.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Document>>;

    async fn all(&self) -> Result<Vec<(String, Document)>>;

    /// `true` when a record was deleted, `false` when there was nothing to delete.
    async fn destroy_by_id(&self, id: &str) -> Result<bool>;

    async fn destroy_by_where(&self, filter: Option<&Value>) -> Result<DestroyCount>;

    async fn destroy_all(&self) -> Result<DestroyCount>;
}

/// CouchDB connector bound to one database.
pub struct CouchConnector {
    manager: Arc<ConnectionManager>,
    lifecycle: LifecycleController,
    accessor: RecordAccessor,
}

impl CouchConnector {
    /// Connector talking HTTP to the server described by `settings`.
    pub fn new(settings: ConnectorSettings) -> Self {
        Self::with_transport(settings, Transport::Http)
    }

    /// Connector over an already constructed server handle.
    pub fn with_server(settings: ConnectorSettings, server: Arc<dyn CouchServer>) -> Self {
        Self::with_transport(settings, Transport::Provided(server))
    }

    pub fn with_transport(settings: ConnectorSettings, transport: Transport) -> Self {
        let manager = Arc::new(ConnectionManager::new(settings, transport));
        Self {
            lifecycle: LifecycleController::new(manager.clone()),
            accessor: RecordAccessor::new(manager.clone()),
            manager,
        }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        self.manager.settings()
    }

    pub fn accessor(&self) -> &RecordAccessor {
        &self.accessor
    }

    /// URL of the connected database.
    pub async fn db_url(&self) -> Result<String> {
        self.manager.connect().await?.db_url()
    }

    /// Query a view of a design document in the connected database.
    pub async fn view(
        &self,
        design: &str,
        view: &str,
        keys: Option<Vec<Value>>,
    ) -> Result<RowsResponse> {
        let conn = self.manager.connect().await?;
        conn.db().view(design, view, &ViewQuery { keys }).await
    }
}

/// Remove and return the identifier carried by a model record.
fn take_record_id(record: &mut Document) -> Option<String> {
    [ID_FIELD, "id"]
        .iter()
        .find_map(|key| match record.remove(*key) {
            Some(Value::Null) | None => None,
            Some(value) => Some(key_to_id(&value)),
        })
}

#[async_trait]
impl Connector for CouchConnector {
    async fn connect(&self) -> Result<Arc<Connection>> {
        self.manager.connect().await
    }

    async fn disconnect(&self) -> Result<bool> {
        Ok(self.manager.disconnect().await)
    }

    async fn ping(&self) -> Result<Value> {
        self.manager.connect().await?.server().ping().await
    }

    async fn update(&self, models: &[String]) -> Result<DatabaseInfo> {
        self.lifecycle.update(models).await
    }

    async fn migrate(&self, models: &[String]) -> Result<DatabaseInfo> {
        self.lifecycle.migrate(models).await
    }

    async fn create(&self, mut record: Document) -> Result<IdRev> {
        match take_record_id(&mut record) {
            Some(id) => self.accessor.insert_with_id(&id, record).await,
            None => self.accessor.insert_without_id(record).await,
        }
    }

    async fn save(&self, id: &str, record: Document) -> Result<IdRev> {
        let mut record = record;
        take_record_id(&mut record);
        match self.accessor.update_with_id(id, record.clone()).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!("Document '{}' does not exist yet, creating it", id);
                self.accessor.insert_with_id(id, record).await
            }
            other => other,
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Document> {
        self.accessor.fetch_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Document>> {
        let results = join_all(ids.iter().map(|id| self.accessor.fetch_by_id(id))).await;
        let mut found = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(doc) => found.push(doc),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    async fn all(&self) -> Result<Vec<(String, Document)>> {
        self.accessor.list_all().await
    }

    async fn destroy_by_id(&self, id: &str) -> Result<bool> {
        Ok(self.accessor.delete_by_id(id).await)
    }

    async fn destroy_by_where(&self, filter: Option<&Value>) -> Result<DestroyCount> {
        let ids = WhereClause::parse(filter).ids();
        destroy_each(&self.accessor, ids).await
    }

    async fn destroy_all(&self) -> Result<DestroyCount> {
        let ids = self
            .accessor
            .list_all()
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        destroy_each(&self.accessor, ids).await
    }
}

/// Delete `ids` one after another; absent records count as zero.
async fn destroy_each(accessor: &RecordAccessor, ids: Vec<String>) -> Result<DestroyCount> {
    let mut count = 0;
    for id in ids {
        match accessor.try_delete_by_id(&id).await {
            Ok(_) => count += 1,
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(DestroyCount { count })
}
