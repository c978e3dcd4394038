//! Translation of identifier where-clauses into document keys.

use couch_client::{CouchError, Result, ID_FIELD};
use serde_json::Value;

/// Model property names that address the document identifier.
pub const ID_PROPERTIES: [&str; 2] = ["id", ID_FIELD];

/// The where-clause shapes the connector understands.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// No filter.
    All,
    /// `{ "id": <value> }`
    Equals(Value),
    /// `{ "id": { "inq": [<value>, ...] } }`
    In(Vec<Value>),
    /// Anything else, kept for diagnostics.
    Unsupported(Value),
}

impl WhereClause {
    /// Classify a model-layer where object.
    pub fn parse(filter: Option<&Value>) -> Self {
        let object = match filter {
            None | Some(Value::Null) => return WhereClause::All,
            Some(Value::Object(object)) if object.is_empty() => return WhereClause::All,
            Some(Value::Object(object)) if object.len() == 1 => object,
            Some(other) => return WhereClause::Unsupported(other.clone()),
        };

        let Some((key, condition)) = object.iter().next() else {
            return WhereClause::All;
        };
        if !ID_PROPERTIES.contains(&key.as_str()) {
            return WhereClause::Unsupported(Value::Object(object.clone()));
        }

        match condition {
            Value::String(_) | Value::Number(_) => WhereClause::Equals(condition.clone()),
            Value::Object(op) if op.len() == 1 => match op.get("inq").or_else(|| op.get("in")) {
                Some(Value::Array(values)) => WhereClause::In(values.clone()),
                _ => WhereClause::Unsupported(Value::Object(object.clone())),
            },
            _ => WhereClause::Unsupported(Value::Object(object.clone())),
        }
    }

    /// Identifiers selected by the clause.
    ///
    /// `All` selects nothing: the connector does not enumerate the whole
    /// database for an unfiltered clause. Unsupported shapes also select
    /// nothing and are logged.
    pub fn ids(&self) -> Vec<String> {
        match self.try_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("{}; matching no documents", e);
                Vec::new()
            }
        }
    }

    /// Like `ids()`, but an unsupported shape is an `UnsupportedQuery` error.
    pub fn try_ids(&self) -> Result<Vec<String>> {
        match self {
            WhereClause::All => Ok(Vec::new()),
            WhereClause::Equals(value) => Ok(vec![key_to_id(value)]),
            WhereClause::In(values) => Ok(values.iter().map(key_to_id).collect()),
            WhereClause::Unsupported(filter) => Err(CouchError::UnsupportedQuery(format!(
                "only equality or inq on the identifier is supported, got {filter}"
            ))),
        }
    }
}

/// String form of an identifier value; numbers become their decimal text.
pub fn key_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
