//! Connector settings and their defaulting rules.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use couch_client::{ClientOptions, CouchError, Document, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROTOCOL: &str = "http";
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5984;

/// Settings for one `CouchConnector`.
///
/// The server URL is either given verbatim in `url` or assembled from
/// `protocol`, `hostname` (falling back to `host`) and `port`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    pub url: Option<String>,
    pub protocol: Option<String>,
    pub hostname: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,

    /// Database name (required).
    pub database: Option<String>,

    pub username: Option<String>,
    pub password: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Design documents to reconcile on update/migrate, keyed by name
    /// (without the `_design/` prefix).
    pub design_docs: BTreeMap<String, Document>,
}

impl ConnectorSettings {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: Some(database.into()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Declare a design document to be reconciled.
    pub fn with_design_doc(mut self, name: impl Into<String>, doc: Document) -> Self {
        self.design_docs.insert(name.into(), doc);
        self
    }

    /// Server base URL after applying defaults.
    pub fn server_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let protocol = self.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL);
        let hostname = self
            .hostname
            .as_deref()
            .or(self.host.as_deref())
            .unwrap_or(DEFAULT_HOSTNAME);
        let port = self.port.unwrap_or(DEFAULT_PORT);
        format!("{protocol}://{hostname}:{port}")
    }

    /// The configured database name; a `Configuration` error when missing or empty.
    pub fn database_name(&self) -> Result<&str> {
        match self.database.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(CouchError::Configuration(
                "Database name must be specified for the CouchDB connector".to_string(),
            )),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Load settings from a TOML, YAML or JSON file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CouchError::Configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let parsed = match extension {
            "toml" => toml::from_str(&content).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            other => {
                return Err(CouchError::Configuration(format!(
                    "Unsupported settings file extension '{other}' (expected toml, yaml or json)"
                )))
            }
        };
        parsed.map_err(|e| {
            CouchError::Configuration(format!("Failed to parse {}: {e}", path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_default_url() {
        let settings = ConnectorSettings::new("people");
        assert_eq!(settings.server_url(), "http://127.0.0.1:5984");
    }

    #[test]
    fn test_hostname_fallback_chain() {
        let mut settings = ConnectorSettings::new("people");
        settings.host = Some("couch.internal".to_string());
        settings.port = Some(6984);
        settings.protocol = Some("https".to_string());
        assert_eq!(settings.server_url(), "https://couch.internal:6984");

        settings.hostname = Some("primary.internal".to_string());
        assert_eq!(settings.server_url(), "https://primary.internal:6984");
    }

    #[test]
    fn test_explicit_url_wins() {
        let mut settings = ConnectorSettings::new("people").with_url("http://admin:pw@db:5984");
        settings.hostname = Some("ignored".to_string());
        assert_eq!(settings.server_url(), "http://admin:pw@db:5984");
    }

    #[test]
    fn test_database_name_required() {
        let err = ConnectorSettings::default().database_name().unwrap_err();
        assert!(matches!(err, CouchError::Configuration(_)));

        let err = ConnectorSettings::new("").database_name().unwrap_err();
        assert!(matches!(err, CouchError::Configuration(_)));

        assert_eq!(ConnectorSettings::new("people").database_name().unwrap(), "people");
    }

    #[test]
    fn test_client_options() {
        let mut settings = ConnectorSettings::new("people");
        settings.username = Some("admin".to_string());
        settings.timeout_secs = Some(30);

        let opts = settings.client_options();
        assert_eq!(opts.username.as_deref(), Some("admin"));
        assert_eq!(opts.password, None);
        assert_eq!(opts.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
database = "people"
host = "couch"
port = 5985

[design_docs.find.views.byName]
map = "function(doc) {{ if (doc.name) emit(doc.name, null); }}"
"#
        )
        .unwrap();

        let settings = ConnectorSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.database.as_deref(), Some("people"));
        assert_eq!(settings.server_url(), "http://couch:5985");
        assert_eq!(
            settings.design_docs["find"]["views"]["byName"]["map"],
            json!("function(doc) { if (doc.name) emit(doc.name, null); }")
        );
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            "{}",
            json!({"database": "people", "url": "http://localhost:5984", "timeout_secs": 5})
        )
        .unwrap();

        let settings = ConnectorSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.server_url(), "http://localhost:5984");
        assert_eq!(settings.timeout_secs, Some(5));
        assert!(settings.design_docs.is_empty());
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = ConnectorSettings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unsupported settings file extension"));
    }
}
