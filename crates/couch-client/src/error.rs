//! Error taxonomy shared by the client and the connector.

use thiserror::Error;

/// Errors returned by CouchDB operations.
#[derive(Error, Debug)]
pub enum CouchError {
    /// Missing or invalid settings (e.g. no database name).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Requested database, record or design document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Revision mismatch on write.
    #[error("Document update conflict: {0}")]
    Conflict(String),

    /// Database creation raced with another creator.
    #[error("Database already exists: {0}")]
    DatabaseExists(String),

    /// Network or protocol failure talking to the server.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Any other non-success response, passed through as reported by the server.
    #[error("HTTP {status}: {error} ({reason})")]
    Http {
        status: u16,
        error: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Where-clause shape the connector cannot translate.
    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),
}

impl CouchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CouchError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchError::Conflict(_))
    }

    /// Classify a non-success response from its status and CouchDB error body.
    ///
    /// CouchDB answers failures with `{"error": "...", "reason": "..."}`.
    pub fn from_status(status: u16, error: Option<String>, reason: Option<String>) -> Self {
        let error = error.unwrap_or_else(|| "unknown_error".to_string());
        let reason = reason.unwrap_or_default();
        match status {
            404 => CouchError::NotFound(describe(&error, &reason)),
            409 => CouchError::Conflict(describe(&error, &reason)),
            412 if error == "file_exists" => CouchError::DatabaseExists(reason),
            _ => CouchError::Http {
                status,
                error,
                reason,
            },
        }
    }
}

fn describe(error: &str, reason: &str) -> String {
    if reason.is_empty() {
        error.to_string()
    } else {
        format!("{error}: {reason}")
    }
}

impl From<reqwest::Error> for CouchError {
    fn from(err: reqwest::Error) -> Self {
        CouchError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CouchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let err = CouchError::from_status(
            404,
            Some("not_found".to_string()),
            Some("missing".to_string()),
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: not_found: missing");
    }

    #[test]
    fn test_classify_conflict() {
        let err = CouchError::from_status(409, Some("conflict".to_string()), None);
        assert!(err.is_conflict());
    }

    #[test]
    fn test_classify_file_exists() {
        let err = CouchError::from_status(
            412,
            Some("file_exists".to_string()),
            Some("The database could not be created, the file already exists.".to_string()),
        );
        assert!(matches!(err, CouchError::DatabaseExists(_)));
    }

    #[test]
    fn test_unclassified_status_passes_through() {
        let err = CouchError::from_status(
            401,
            Some("unauthorized".to_string()),
            Some("Name or password is incorrect.".to_string()),
        );
        match err {
            CouchError::Http {
                status,
                error,
                reason,
            } => {
                assert_eq!(status, 401);
                assert_eq!(error, "unauthorized");
                assert_eq!(reason, "Name or password is incorrect.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!CouchError::from_status(412, None, None).is_not_found());
    }
}
