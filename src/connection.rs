//! Lazily established, memoized connection to one database.

use std::sync::Arc;

use couch_client::{CouchDatabase, CouchError, CouchServer, HttpServer, Result, Url};
use tokio::sync::Mutex;

use crate::config::ConnectorSettings;

/// A live handle bound to (server URL, database name).
pub struct Connection {
    url: String,
    database: String,
    server: Arc<dyn CouchServer>,
    db: Arc<dyn CouchDatabase>,
}

impl Connection {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn server(&self) -> &Arc<dyn CouchServer> {
        &self.server
    }

    pub fn db(&self) -> &Arc<dyn CouchDatabase> {
        &self.db
    }

    /// URL of the connected database, with the name encoded as one path segment.
    pub fn db_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.url).map_err(|e| {
            CouchError::Configuration(format!("Invalid CouchDB URL '{}': {e}", self.url))
        })?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database);
        }
        Ok(url.to_string())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("url", &self.url)
            .field("database", &self.database)
            .finish()
    }
}

/// Where connections get their server handle from.
#[derive(Clone)]
pub enum Transport {
    /// Build an `HttpServer` from the settings on every (re)connect.
    Http,
    /// Reuse a caller-provided server, e.g. an in-memory store.
    Provided(Arc<dyn CouchServer>),
}

/// Owns the memoized connection.
///
/// Initialization is serialized behind one async mutex: concurrent callers of
/// `connect()` wait for the first one and receive the same `Arc`.
/// `disconnect()` only drops the stored reference; the transport's pool
/// closes sockets on its own.
pub struct ConnectionManager {
    settings: ConnectorSettings,
    transport: Transport,
    state: Mutex<Option<Arc<Connection>>>,
}

impl ConnectionManager {
    pub fn new(settings: ConnectorSettings, transport: Transport) -> Self {
        Self {
            settings,
            transport,
            state: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ConnectorSettings {
        &self.settings
    }

    /// Return the live connection, establishing it on first use.
    pub async fn connect(&self) -> Result<Arc<Connection>> {
        let mut state = self.state.lock().await;
        if let Some(conn) = state.as_ref() {
            return Ok(conn.clone());
        }

        let database = self.settings.database_name()?.to_string();
        let url = self.settings.server_url();
        let server: Arc<dyn CouchServer> = match &self.transport {
            Transport::Http => Arc::new(HttpServer::new(&url, self.settings.client_options())?),
            Transport::Provided(server) => server.clone(),
        };
        let db = server.use_database(&database);

        tracing::debug!("Connected to CouchDB at {} (database: {})", url, database);

        let conn = Arc::new(Connection {
            url,
            database,
            server,
            db,
        });
        *state = Some(conn.clone());
        Ok(conn)
    }

    /// Forget the memoized connection. Returns `true`, also when none existed.
    pub async fn disconnect(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.take().is_some() {
            tracing::debug!("Disconnected from CouchDB");
        }
        true
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryServer;

    fn manager(settings: ConnectorSettings) -> ConnectionManager {
        ConnectionManager::new(settings, Transport::Provided(Arc::new(MemoryServer::new())))
    }

    #[tokio::test]
    async fn test_connect_requires_database() {
        let manager = manager(ConnectorSettings::default());
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, CouchError::Configuration(_)));
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_is_memoized() {
        let manager = manager(ConnectorSettings::new("people"));
        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.database(), "people");
        assert_eq!(first.db().name(), "people");
    }

    #[tokio::test]
    async fn test_concurrent_connect_shares_connection() {
        let manager = Arc::new(manager(ConnectorSettings::new("people")));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.connect().await.unwrap() })
            })
            .collect();

        let mut conns = Vec::new();
        for handle in handles {
            conns.push(handle.await.unwrap());
        }
        assert!(conns.iter().all(|c| Arc::ptr_eq(c, &conns[0])));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = manager(ConnectorSettings::new("people"));
        assert!(manager.disconnect().await);

        let first = manager.connect().await.unwrap();
        assert!(manager.disconnect().await);
        assert!(manager.disconnect().await);
        assert!(!manager.is_connected().await);

        let second = manager.connect().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_race() {
        let manager = Arc::new(manager(ConnectorSettings::new("people")));
        let connect = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect().await.map(|_| ()) })
        };
        let disconnect = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.disconnect().await })
        };
        connect.await.unwrap().unwrap();
        assert!(disconnect.await.unwrap());

        // Whatever the interleaving, the manager is usable afterwards.
        manager.connect().await.unwrap();
        assert!(manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_db_url() {
        let manager = manager(ConnectorSettings::new("lorem"));
        let conn = manager.connect().await.unwrap();
        assert_eq!(conn.db_url().unwrap(), "http://127.0.0.1:5984/lorem");

        let manager = ConnectionManager::new(
            ConnectorSettings::new("lorem/ipsum"),
            Transport::Provided(Arc::new(MemoryServer::new())),
        );
        let conn = manager.connect().await.unwrap();
        assert_eq!(conn.db_url().unwrap(), "http://127.0.0.1:5984/lorem%2Fipsum");
    }
}
