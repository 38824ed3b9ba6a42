use crate::error::StoreError;
use crate::ports::statement::{Identifier, PropertyMap, Statement};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Trait for property-graph store backends.
/// Implementations must be thread-safe (Send + Sync): export batches are
/// submitted from a worker pool.
pub trait GraphStore: Send + Sync {
    fn execute(&self, statement: &Statement) -> Result<(), StoreError>;
    fn snapshot(&self) -> Result<StoreSnapshot, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub start_id: u64,
    pub end_id: u64,
    pub rel_type: String,
    pub properties: PropertyMap,
}

/// Point-in-time copy of a store's content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub nodes: BTreeMap<u64, StoredNode>,
    /// Sorted by `(start_id, end_id, rel_type)`.
    pub relationships: Vec<StoredRelationship>,
    pub indexed: bool,
}

impl StoreSnapshot {
    pub fn node(&self, id: u64) -> Option<&StoredNode> {
        self.nodes.get(&id)
    }

    pub fn nodes_with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = (u64, &'a StoredNode)> + 'a {
        self.nodes
            .iter()
            .filter(move |(_, n)| n.labels.iter().any(|l| l == label))
            .map(|(id, n)| (*id, n))
    }

    pub fn relationships_of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a StoredRelationship> + 'a {
        self.relationships.iter().filter(move |r| r.rel_type == rel_type)
    }
}

fn node_from_statement(labels: &[Identifier], properties: &PropertyMap) -> StoredNode {
    StoredNode {
        labels: labels.iter().map(|l| l.as_str().to_string()).collect(),
        properties: properties.clone(),
    }
}

// ============================================================================
// MemoryGraphStore - In-process store using DashMap
// ============================================================================

/// A statement as the memory store saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedStatement {
    pub cypher: String,
    pub rows: usize,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    pub nodes: DashMap<u64, StoredNode>,
    pub relationships: DashMap<(u64, u64, String), PropertyMap>,
    indexed: AtomicBool,
    history: Mutex<Vec<ExecutedStatement>>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed so far, in completion order.
    pub fn history(&self) -> Vec<ExecutedStatement> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn record(&self, statement: &Statement) -> Result<(), StoreError> {
        let mut history = self
            .history
            .lock()
            .map_err(|_| StoreError::Rejected("statement history lock poisoned".to_string()))?;
        history.push(ExecutedStatement {
            cypher: statement.cypher(),
            rows: statement.row_count(),
        });
        Ok(())
    }
}

impl GraphStore for MemoryGraphStore {
    fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        match statement {
            Statement::Wipe => {
                self.relationships.clear();
                self.nodes.clear();
                self.indexed.store(false, Ordering::SeqCst);
            }
            Statement::CreateIndex => {
                self.indexed.store(true, Ordering::SeqCst);
            }
            Statement::CreateNodes { labels, rows } => {
                for row in rows {
                    let id = row.id().ok_or(StoreError::MissingId)?;
                    self.nodes.insert(id, node_from_statement(labels, &row.properties));
                }
            }
            Statement::MergeRelationships { rel_type, rows } => {
                for row in rows {
                    // MATCH semantics: rows with a missing endpoint are skipped.
                    if !self.nodes.contains_key(&row.start_id) || !self.nodes.contains_key(&row.end_id) {
                        continue;
                    }
                    self.relationships.insert(
                        (row.start_id, row.end_id, rel_type.as_str().to_string()),
                        row.properties.clone(),
                    );
                }
            }
        }
        self.record(statement)
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let nodes = self
            .nodes
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect();
        let mut relationships: Vec<StoredRelationship> = self
            .relationships
            .iter()
            .map(|r| {
                let (start_id, end_id, rel_type) = r.key().clone();
                StoredRelationship {
                    start_id,
                    end_id,
                    rel_type,
                    properties: r.value().clone(),
                }
            })
            .collect();
        relationships.sort_by(|a, b| {
            (a.start_id, a.end_id, &a.rel_type).cmp(&(b.start_id, b.end_id, &b.rel_type))
        });
        Ok(StoreSnapshot {
            nodes,
            relationships,
            indexed: self.indexed.load(Ordering::SeqCst),
        })
    }
}

// ============================================================================
// SledGraphStore - Persistent on-disk store using sled
// ============================================================================

const INDEX_KEY: &[u8] = b"index:Node.id";

pub struct SledGraphStore {
    db: Db,
    nodes_tree: sled::Tree,
    relationships_tree: sled::Tree,
    meta_tree: sled::Tree,
}

impl SledGraphStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let nodes_tree = db.open_tree("nodes")?;
        let relationships_tree = db.open_tree("relationships")?;
        let meta_tree = db.open_tree("meta")?;

        Ok(Self {
            db,
            nodes_tree,
            relationships_tree,
            meta_tree,
        })
    }

    fn node_key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }
}

impl GraphStore for SledGraphStore {
    fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        match statement {
            Statement::Wipe => {
                self.relationships_tree.clear()?;
                self.nodes_tree.clear()?;
                self.meta_tree.clear()?;
            }
            Statement::CreateIndex => {
                self.meta_tree.insert(INDEX_KEY, vec![1u8])?;
            }
            Statement::CreateNodes { labels, rows } => {
                let mut batch = sled::Batch::default();
                for row in rows {
                    let id = row.id().ok_or(StoreError::MissingId)?;
                    let bytes = bincode::serialize(&node_from_statement(labels, &row.properties))?;
                    batch.insert(Self::node_key(id).to_vec(), bytes);
                }
                self.nodes_tree.apply_batch(batch)?;
            }
            Statement::MergeRelationships { rel_type, rows } => {
                let mut batch = sled::Batch::default();
                for row in rows {
                    if !self.nodes_tree.contains_key(Self::node_key(row.start_id))?
                        || !self.nodes_tree.contains_key(Self::node_key(row.end_id))?
                    {
                        continue;
                    }
                    let key = bincode::serialize(&(row.start_id, row.end_id, rel_type.as_str()))?;
                    batch.insert(key, bincode::serialize(&row.properties)?);
                }
                self.relationships_tree.apply_batch(batch)?;
            }
        }
        self.db.flush()?;
        Ok(())
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let mut nodes = BTreeMap::new();
        for entry in self.nodes_tree.iter() {
            let (key, value) = entry?;
            let mut id = [0u8; 8];
            if key.len() != id.len() {
                return Err(StoreError::Rejected("malformed node key".to_string()));
            }
            id.copy_from_slice(&key);
            nodes.insert(u64::from_be_bytes(id), bincode::deserialize(&value)?);
        }

        let mut relationships = Vec::new();
        for entry in self.relationships_tree.iter() {
            let (key, value) = entry?;
            let (start_id, end_id, rel_type): (u64, u64, String) = bincode::deserialize(&key)?;
            relationships.push(StoredRelationship {
                start_id,
                end_id,
                rel_type,
                properties: bincode::deserialize(&value)?,
            });
        }
        relationships.sort_by(|a, b| {
            (a.start_id, a.end_id, &a.rel_type).cmp(&(b.start_id, b.end_id, &b.rel_type))
        });

        Ok(StoreSnapshot {
            nodes,
            relationships,
            indexed: self.meta_tree.contains_key(INDEX_KEY)?,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
