//! CouchDB document-store client.
//!
//! Defines the `CouchServer` / `CouchDatabase` traits the connector is written
//! against, the wire types of the CouchDB HTTP API, and `HttpServer`, the
//! `reqwest`-based implementation.
//!
//! Every failure is classified into `CouchError` so callers can recover
//! locally from `NotFound` and surface `Conflict` unchanged.

mod error;
mod http;
mod traits;
mod types;

pub use error::{CouchError, Result};
pub use http::{ClientOptions, HttpDatabase, HttpServer};
pub use traits::{CouchDatabase, CouchServer};
pub use types::{
    design_doc_id, is_design_doc_id, DatabaseInfo, Document, DocumentRow, ListOptions,
    RowsResponse, ViewQuery, WriteResult, DESIGN_PREFIX, ID_FIELD, REV_FIELD,
};

// Re-exported so dependents can build URLs without a direct `url` dependency.
pub use reqwest::Url;
