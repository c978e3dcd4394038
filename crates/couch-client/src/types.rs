//! Wire types exchanged with the CouchDB HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved key holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Reserved key holding a document's revision token.
pub const REV_FIELD: &str = "_rev";

/// Identifier namespace reserved for design documents.
pub const DESIGN_PREFIX: &str = "_design/";

/// A JSON document body.
pub type Document = Map<String, Value>;

/// Identifier of the design document called `name`.
pub fn design_doc_id(name: &str) -> String {
    format!("{DESIGN_PREFIX}{name}")
}

pub fn is_design_doc_id(id: &str) -> bool {
    id.starts_with(DESIGN_PREFIX)
}

/// Database descriptor returned by `GET /{db}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    /// Opaque sequence marker (a string on CouchDB 2+, a number on 1.x).
    #[serde(default)]
    pub update_seq: Value,
    /// Every other field the server reports, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a successful document write or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    pub id: String,
    pub rev: String,
}

/// One row of `_all_docs` or of a view response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Document>,
}

/// Options for listing the documents of a database.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub include_docs: bool,
}

/// Key lookup against a design-document view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<Value>>,
}

impl ViewQuery {
    pub fn keys(keys: Vec<Value>) -> Self {
        Self { keys: Some(keys) }
    }
}

/// Response of `_all_docs` and view queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub total_rows: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub rows: Vec<DocumentRow>,
}
