// Relationships inferred by the analysis and added only to the exported graph.

use crate::domain::program::NodeRef;
use std::collections::{BTreeMap, HashSet};

pub const THREAD_ENTRY: &str = "THREAD_ENTRY";
pub const THREAD_SPAWN: &str = "THREAD_SPAWN";
pub const THREAD_MOVE_VARIABLE: &str = "THREAD_MOVE_VARIABLE";
pub const DROP_CALL: &str = "DROP_CALL";

#[derive(Debug, Clone)]
pub struct SynthesizedEdge {
    pub start: NodeRef,
    pub end: NodeRef,
    pub rel_type: String,
    pub properties: BTreeMap<String, String>,
}

impl SynthesizedEdge {
    pub fn new(start: &NodeRef, end: &NodeRef, rel_type: impl Into<String>) -> Self {
        Self {
            start: start.clone(),
            end: end.clone(),
            rel_type: rel_type.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Committed synthesized edges, unique on `(start, end, type)`. The first
/// insertion of a key wins.
#[derive(Debug, Default)]
pub struct SynthesizedEdges {
    edges: Vec<SynthesizedEdge>,
    keys: HashSet<(NodeRef, NodeRef, String)>,
}

impl SynthesizedEdges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an edge with the same key is already present.
    pub fn insert(&mut self, edge: SynthesizedEdge) -> bool {
        let key = (edge.start.clone(), edge.end.clone(), edge.rel_type.clone());
        if !self.keys.insert(key) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &SynthesizedEdge> {
        self.edges.iter()
    }

    pub fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a SynthesizedEdge> + 'a {
        self.edges.iter().filter(move |e| e.rel_type == rel_type)
    }

    pub fn has_relationship(&self, start: &NodeRef, end: &NodeRef, rel_type: &str) -> bool {
        self.keys
            .contains(&(start.clone(), end.clone(), rel_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
