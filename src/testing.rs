//! In-memory CouchDB stand-in for tests.
//!
//! `MemoryServer` implements the store traits with CouchDB's revision rules:
//! writes to an existing document need its current `_rev`, deletes need the
//! exact revision, and creating an existing database reports `file_exists`.
//! Views are evaluated only for map functions of the form
//! `emit(doc.<field>, ...)`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use couch_client::{
    is_design_doc_id, CouchDatabase, CouchError, CouchServer, DatabaseInfo, Document, DocumentRow,
    ListOptions, Result, RowsResponse, ViewQuery, WriteResult, DESIGN_PREFIX, ID_FIELD, REV_FIELD,
};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryDb {
    docs: BTreeMap<String, Value>,
    update_seq: u64,
}

#[derive(Default)]
struct State {
    databases: BTreeMap<String, MemoryDb>,
}

/// In-memory server holding any number of databases.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<State>>,
    creations: Arc<AtomicUsize>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a database was actually created.
    pub fn database_creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Store `body` at `id` verbatim, bypassing revision checks.
    ///
    /// Panics if the database does not exist.
    pub async fn put_raw(&self, db: &str, id: &str, body: Value) {
        let mut state = self.state.lock().await;
        let db = state
            .databases
            .get_mut(db)
            .expect("put_raw on a missing database");
        db.docs.insert(id.to_string(), body);
        db.update_seq += 1;
    }

    /// Number of stored documents (design documents included).
    pub async fn document_count(&self, db: &str) -> Option<usize> {
        let state = self.state.lock().await;
        state.databases.get(db).map(|db| db.docs.len())
    }

    pub async fn has_database(&self, db: &str) -> bool {
        self.state.lock().await.databases.contains_key(db)
    }
}

fn missing_database() -> CouchError {
    CouchError::NotFound("not_found: Database does not exist.".to_string())
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, uuid::Uuid::new_v4().simple())
}

fn rev_of(doc: &Value) -> Option<&str> {
    doc.get(REV_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl CouchServer for MemoryServer {
    async fn ping(&self) -> Result<Value> {
        Ok(json!({"couchdb": "Welcome", "vendor": {"name": "memory"}}))
    }

    async fn create_database(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.databases.contains_key(name) {
            return Err(CouchError::from_status(
                412,
                Some("file_exists".to_string()),
                Some("The database could not be created, the file already exists.".to_string()),
            ));
        }
        state.databases.insert(name.to_string(), MemoryDb::default());
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy_database(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .databases
            .remove(name)
            .map(|_| ())
            .ok_or_else(missing_database)
    }

    async fn database_info(&self, name: &str) -> Result<DatabaseInfo> {
        let state = self.state.lock().await;
        let db = state.databases.get(name).ok_or_else(missing_database)?;
        Ok(DatabaseInfo {
            db_name: name.to_string(),
            doc_count: db.docs.len() as u64,
            doc_del_count: 0,
            update_seq: json!(db.update_seq),
            extra: Map::new(),
        })
    }

    fn use_database(&self, name: &str) -> Arc<dyn CouchDatabase> {
        Arc::new(MemoryDatabase {
            state: self.state.clone(),
            name: name.to_string(),
        })
    }
}

/// Database handle of a `MemoryServer`.
pub struct MemoryDatabase {
    state: Arc<Mutex<State>>,
    name: String,
}

#[async_trait]
impl CouchDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> Result<Value> {
        let state = self.state.lock().await;
        let db = state.databases.get(&self.name).ok_or_else(missing_database)?;
        db.docs
            .get(id)
            .cloned()
            .ok_or_else(|| CouchError::NotFound("not_found: missing".to_string()))
    }

    async fn insert(&self, doc: &Document, target_id: Option<&str>) -> Result<WriteResult> {
        let mut state = self.state.lock().await;
        let db = state
            .databases
            .get_mut(&self.name)
            .ok_or_else(missing_database)?;

        let id = match target_id {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().simple().to_string(),
        };
        let supplied = doc.get(REV_FIELD).and_then(Value::as_str);
        let current = db.docs.get(&id).and_then(rev_of);
        if supplied != current {
            return Err(CouchError::Conflict(
                "conflict: Document update conflict.".to_string(),
            ));
        }

        let rev = next_rev(current);
        let mut stored = doc.clone();
        stored.insert(ID_FIELD.to_string(), json!(id));
        stored.insert(REV_FIELD.to_string(), json!(rev));
        db.docs.insert(id.clone(), Value::Object(stored));
        db.update_seq += 1;

        Ok(WriteResult { id, rev })
    }

    async fn destroy(&self, id: &str, rev: &str) -> Result<WriteResult> {
        let mut state = self.state.lock().await;
        let db = state
            .databases
            .get_mut(&self.name)
            .ok_or_else(missing_database)?;

        let current = db
            .docs
            .get(id)
            .ok_or_else(|| CouchError::NotFound("not_found: missing".to_string()))?;
        if rev_of(current) != Some(rev) {
            return Err(CouchError::Conflict(
                "conflict: Document update conflict.".to_string(),
            ));
        }
        db.docs.remove(id);
        db.update_seq += 1;

        Ok(WriteResult {
            id: id.to_string(),
            rev: next_rev(Some(rev)),
        })
    }

    async fn list(&self, opts: ListOptions) -> Result<RowsResponse> {
        let state = self.state.lock().await;
        let db = state.databases.get(&self.name).ok_or_else(missing_database)?;

        let rows: Vec<DocumentRow> = db
            .docs
            .iter()
            .map(|(id, doc)| DocumentRow {
                id: Some(id.clone()),
                key: json!(id),
                value: json!({"rev": rev_of(doc)}),
                doc: match (opts.include_docs, doc) {
                    (true, Value::Object(doc)) => Some(doc.clone()),
                    _ => None,
                },
            })
            .collect();

        Ok(RowsResponse {
            total_rows: Some(rows.len() as u64),
            offset: Some(0),
            rows,
        })
    }

    async fn view(&self, design: &str, view: &str, query: &ViewQuery) -> Result<RowsResponse> {
        let state = self.state.lock().await;
        let db = state.databases.get(&self.name).ok_or_else(missing_database)?;

        let design_id = format!("{DESIGN_PREFIX}{design}");
        let map = db
            .docs
            .get(&design_id)
            .ok_or_else(|| CouchError::NotFound("not_found: missing".to_string()))?
            .pointer(&format!("/views/{view}/map"))
            .and_then(Value::as_str)
            .ok_or_else(|| CouchError::NotFound("not_found: missing_named_view".to_string()))?;
        let field = emitted_field(map).ok_or_else(|| CouchError::Http {
            status: 500,
            error: "unsupported_view".to_string(),
            reason: format!("cannot evaluate map function: {map}"),
        })?;

        let emitted: Vec<(Value, &String)> = db
            .docs
            .iter()
            .filter(|(id, _)| !is_design_doc_id(id))
            .filter_map(|(id, doc)| match doc.get(field) {
                Some(Value::Null) | None => None,
                Some(key) => Some((key.clone(), id)),
            })
            .collect();

        let selected: Vec<&(Value, &String)> = match &query.keys {
            Some(keys) => keys
                .iter()
                .flat_map(|key| emitted.iter().filter(move |(k, _)| k == key))
                .collect(),
            None => emitted.iter().collect(),
        };

        let rows: Vec<DocumentRow> = selected
            .into_iter()
            .map(|(key, id)| DocumentRow {
                id: Some((*id).clone()),
                key: key.clone(),
                value: Value::Null,
                doc: None,
            })
            .collect();

        Ok(RowsResponse {
            total_rows: Some(rows.len() as u64),
            offset: Some(0),
            rows,
        })
    }
}

/// The `<field>` of a map function emitting `doc.<field>`.
fn emitted_field(map: &str) -> Option<&str> {
    let start = map.find("emit(doc.")? + "emit(doc.".len();
    let rest = &map[start..];
    let end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    (end > 0).then(|| &rest[..end])
}
