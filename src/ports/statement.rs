//! Property-graph store protocol.
//!
//! Every write the exporter performs is one of four [`Statement`]s. Stores
//! interpret them directly; [`Statement::cypher`] gives the equivalent query
//! text for logging and for Cypher-speaking backends.

use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A label or relationship type that is safe to splice into query text:
/// `[A-Za-z_][A-Za-z0-9_]*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: &str) -> Result<Self, ExportError> {
        let mut chars = raw.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            Ok(Self(raw.to_string()))
        } else {
            Err(ExportError::UnsafeIdentifier(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Text(String),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Text(_) => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<u64> for PropertyValue {
    fn from(value: u64) -> Self {
        PropertyValue::Int(value as i64)
    }
}

pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Property key holding the surrogate id on every exported node.
pub const ID_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRow {
    pub properties: PropertyMap,
}

impl NodeRow {
    pub fn id(&self) -> Option<u64> {
        self.properties
            .get(ID_KEY)
            .and_then(PropertyValue::as_int)
            .and_then(|v| u64::try_from(v).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub start_id: u64,
    pub end_id: u64,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Wipe,
    CreateIndex,
    CreateNodes {
        labels: Vec<Identifier>,
        rows: Vec<NodeRow>,
    },
    MergeRelationships {
        rel_type: Identifier,
        rows: Vec<RelationshipRow>,
    },
}

impl Statement {
    pub fn cypher(&self) -> String {
        match self {
            Statement::Wipe => "MATCH (n) DETACH DELETE n".to_string(),
            Statement::CreateIndex => "CREATE INDEX IF NOT EXISTS FOR (n:Node) ON (n.id)".to_string(),
            Statement::CreateNodes { labels, .. } => {
                let labels: Vec<&str> = labels.iter().map(Identifier::as_str).collect();
                format!("UNWIND $props AS m CREATE (n:{}) SET n = m", labels.join(":"))
            }
            Statement::MergeRelationships { rel_type, .. } => format!(
                "UNWIND $info AS row MATCH (s:Node {{id: row.startId}}) MATCH (e:Node {{id: row.endId}}) MERGE (s)-[r:{rel_type}]->(e) SET r = row.props"
            ),
        }
    }

    /// Rows carried by the statement.
    pub fn row_count(&self) -> usize {
        match self {
            Statement::Wipe | Statement::CreateIndex => 0,
            Statement::CreateNodes { rows, .. } => rows.len(),
            Statement::MergeRelationships { rows, .. } => rows.len(),
        }
    }
}
