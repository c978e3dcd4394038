//! Reconciliation of declared design documents with the server's copies.

use std::collections::BTreeMap;
use std::sync::Arc;

use couch_client::{design_doc_id, CouchError, Document, Result, ID_FIELD, REV_FIELD};
use futures::future::join_all;
use serde_json::Value;

use crate::connection::ConnectionManager;

/// What reconciliation did to one design document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub name: String,
    pub id: String,
    pub rev: String,
    pub action: ReconcileAction,
}

/// Overlay `declared` onto `stored`.
///
/// Top-level keys of `declared` replace the stored ones, except that when
/// both sides hold an object (e.g. `views`) the merge goes one level down:
/// declared entries replace stored entries of the same name and every other
/// stored entry is kept. `_id` and `_rev` always come from `stored`.
pub fn merge_design_doc(mut stored: Document, declared: &Document) -> Document {
    for (key, value) in declared {
        if key == ID_FIELD || key == REV_FIELD {
            continue;
        }
        match (stored.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                for (name, definition) in incoming {
                    existing.insert(name.clone(), definition.clone());
                }
            }
            _ => {
                stored.insert(key.clone(), value.clone());
            }
        }
    }
    stored
}

/// Writes declared design documents, merging into existing copies.
pub struct DesignDocReconciler {
    manager: Arc<ConnectionManager>,
}

impl DesignDocReconciler {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Reconcile every declared document.
    ///
    /// All documents are processed even when some fail; the first failure
    /// (in declaration order) is returned.
    pub async fn reconcile(
        &self,
        design_docs: &BTreeMap<String, Document>,
    ) -> Result<Vec<ReconcileOutcome>> {
        let results = join_all(
            design_docs
                .iter()
                .map(|(name, declared)| self.reconcile_one(name, declared)),
        )
        .await;

        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_error = None;
        for (name, result) in design_docs.keys().zip(results) {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!("Failed to reconcile design doc '{}': {}", name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Reconcile one design document called `name`.
    pub async fn reconcile_one(&self, name: &str, declared: &Document) -> Result<ReconcileOutcome> {
        let id = design_doc_id(name);
        let conn = self.manager.connect().await?;
        let db = conn.db();

        match db.get(&id).await {
            Ok(Value::Object(stored)) => {
                tracing::debug!("Updating design doc: {}", name);
                let merged = merge_design_doc(stored, declared);
                let res = db.insert(&merged, Some(&id)).await?;
                Ok(ReconcileOutcome {
                    name: name.to_string(),
                    id,
                    rev: res.rev,
                    action: ReconcileAction::Updated,
                })
            }
            Ok(Value::Null) | Err(CouchError::NotFound(_)) => {
                tracing::debug!("Creating design doc: {}", name);
                let mut fresh = declared.clone();
                fresh.remove(ID_FIELD);
                fresh.remove(REV_FIELD);
                let res = db.insert(&fresh, Some(&id)).await?;
                Ok(ReconcileOutcome {
                    name: name.to_string(),
                    id,
                    rev: res.rev,
                    action: ReconcileAction::Created,
                })
            }
            Ok(other) => Err(CouchError::Transport(format!(
                "Unexpected body for design doc '{id}': {other}"
            ))),
            Err(e) => Err(e),
        }
    }
}
