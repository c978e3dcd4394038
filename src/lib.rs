//! CouchDB connector
//!
//! A data-access adapter that lets a generic model layer persist and query
//! records in CouchDB over HTTP.
//!
//! # Features
//!
//! - Lazy connection: one memoized connection per connector, shared by
//!   concurrent callers
//! - Database lifecycle: `update` creates the database if missing, `migrate`
//!   drops and recreates it
//! - Design documents: declared views are merged into the server's copies,
//!   keeping views added by other means
//! - Optimistic concurrency: updates fill in the current revision, conflicts
//!   are surfaced and never retried
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the database and its design documents
//! couch-connector --database people --config couch.toml update
//!
//! # Read a record
//! couch-connector --url http://127.0.0.1:5984 --database people get 0
//! ```

pub mod accessor;
pub mod config;
pub mod connection;
pub mod connector;
pub mod design;
pub mod lifecycle;
pub mod query;
pub mod testing;

pub use accessor::{IdRev, RecordAccessor};
pub use config::ConnectorSettings;
pub use connection::{Connection, ConnectionManager, Transport};
pub use connector::{Connector, CouchConnector, DestroyCount};
pub use design::{merge_design_doc, DesignDocReconciler, ReconcileAction, ReconcileOutcome};
pub use lifecycle::LifecycleController;
pub use query::WhereClause;

// Re-export the client crate for convenience
pub use couch_client;
pub use couch_client::{CouchError, DatabaseInfo, Document, Result};

use clap::Parser;

#[derive(Parser, Clone, Debug)]
pub struct CouchOpts {
    /// CouchDB server URL (defaults to http://127.0.0.1:5984)
    #[arg(long, env = "COUCHDB_URL")]
    pub url: Option<String>,

    /// Database name
    #[arg(long, env = "COUCHDB_DATABASE")]
    pub database: Option<String>,

    /// CouchDB username
    #[arg(long, env = "COUCHDB_USERNAME")]
    pub username: Option<String>,

    /// CouchDB password
    #[arg(long, env = "COUCHDB_PASSWORD")]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Settings file (TOML, YAML or JSON); flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<std::path::PathBuf>,
}

impl CouchOpts {
    /// Settings from the optional file, overridden by explicit flags.
    pub fn to_settings(&self) -> Result<ConnectorSettings> {
        let mut settings = match &self.config {
            Some(path) => ConnectorSettings::from_file(path)?,
            None => ConnectorSettings::default(),
        };
        if let Some(url) = &self.url {
            settings.url = Some(url.clone());
        }
        if let Some(database) = &self.database {
            settings.database = Some(database.clone());
        }
        if let Some(username) = &self.username {
            settings.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            settings.password = Some(password.clone());
        }
        if let Some(timeout) = self.timeout {
            settings.timeout_secs = Some(timeout);
        }
        Ok(settings)
    }
}
