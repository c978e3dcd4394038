//! Database lifecycle: create-if-missing (update) and drop-and-recreate (migrate).

use std::sync::Arc;

use couch_client::{CouchError, DatabaseInfo, Result};
use tokio::sync::Mutex;

use crate::connection::{Connection, ConnectionManager};
use crate::design::DesignDocReconciler;

/// Runs `update` / `migrate` for one connector.
///
/// Lifecycle operations of one connector are serialized so that concurrent
/// `update` calls create the database once.
pub struct LifecycleController {
    manager: Arc<ConnectionManager>,
    reconciler: DesignDocReconciler,
    lock: Mutex<()>,
}

impl LifecycleController {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            reconciler: DesignDocReconciler::new(manager.clone()),
            manager,
            lock: Mutex::new(()),
        }
    }

    /// Ensure the database exists without touching its records, then
    /// reconcile the declared design documents.
    ///
    /// `models` is accepted for interface symmetry; indexes are not derived
    /// from model definitions.
    pub async fn update(&self, models: &[String]) -> Result<DatabaseInfo> {
        let _guard = self.lock.lock().await;
        let conn = self.manager.connect().await?;
        tracing::info!("Updating database '{}' (models: {:?})", conn.database(), models);

        if database_info_if_exists(&conn).await?.is_none() {
            create_database(&conn).await?;
        }
        self.reconcile_design_docs().await?;
        conn.server().database_info(conn.database()).await
    }

    /// Drop the database (if present) and recreate it empty, then reconcile
    /// the declared design documents.
    pub async fn migrate(&self, models: &[String]) -> Result<DatabaseInfo> {
        let _guard = self.lock.lock().await;
        let conn = self.manager.connect().await?;
        tracing::info!("Migrating database '{}' (models: {:?})", conn.database(), models);

        match conn.server().destroy_database(conn.database()).await {
            Ok(()) => tracing::debug!("Dropped database '{}'", conn.database()),
            Err(CouchError::NotFound(_)) => {
                tracing::debug!("Database '{}' did not exist", conn.database())
            }
            Err(e) => return Err(e),
        }
        create_database(&conn).await?;
        self.reconcile_design_docs().await?;
        conn.server().database_info(conn.database()).await
    }

    async fn reconcile_design_docs(&self) -> Result<()> {
        let design_docs = &self.manager.settings().design_docs;
        if design_docs.is_empty() {
            return Ok(());
        }
        let outcomes = self.reconciler.reconcile(design_docs).await?;
        for outcome in outcomes {
            tracing::info!("Design doc '{}' {:?} at {}", outcome.id, outcome.action, outcome.rev);
        }
        Ok(())
    }
}

/// `None` when the database does not exist; any other failure is fatal.
async fn database_info_if_exists(conn: &Connection) -> Result<Option<DatabaseInfo>> {
    match conn.server().database_info(conn.database()).await {
        Ok(info) => Ok(Some(info)),
        Err(CouchError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Create the database; losing a creation race to another client is fine.
async fn create_database(conn: &Connection) -> Result<()> {
    match conn.server().create_database(conn.database()).await {
        Ok(()) => {
            tracing::info!("Created database '{}'", conn.database());
            Ok(())
        }
        Err(CouchError::DatabaseExists(_)) => {
            tracing::debug!("Database '{}' was created concurrently", conn.database());
            Ok(())
        }
        Err(e) => Err(e),
    }
}
