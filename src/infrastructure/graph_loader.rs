// Builds a ProgramGraph from a JSON interchange document.

use crate::api::dto::GraphDocument;
use crate::domain::program::{Node, NodeRef, ProgramGraph};
use crate::error::LoadError;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub struct LoadedGraph {
    pub graph: ProgramGraph,
    /// Document key -> node handle.
    pub keys: HashMap<String, NodeRef>,
}

impl LoadedGraph {
    pub fn node(&self, key: &str) -> Option<&NodeRef> {
        self.keys.get(key)
    }
}

pub fn load_graph(path: &Path) -> Result<LoadedGraph, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let loaded = from_json_str(&content)?;
    info!(
        target: "threadtrace::loader",
        path = %path.display(),
        nodes = loaded.graph.nodes().len(),
        edges = loaded.graph.edges().len(),
        "graph loaded"
    );
    Ok(loaded)
}

pub fn from_json_str(json: &str) -> Result<LoadedGraph, LoadError> {
    let document: GraphDocument = serde_json::from_str(json)?;
    from_document(document)
}

pub fn from_document(document: GraphDocument) -> Result<LoadedGraph, LoadError> {
    let mut graph = ProgramGraph::new();
    let mut keys: HashMap<String, NodeRef> = HashMap::with_capacity(document.nodes.len());

    for dto in document.nodes {
        if keys.contains_key(&dto.key) {
            return Err(LoadError::DuplicateKey(dto.key));
        }
        let mut node = Node::new(dto.kind, dto.name);
        node.code = dto.code;
        node.host_id = dto.host_id;
        node.access = dto.access;
        node.properties = dto.properties;
        keys.insert(dto.key, graph.add_node(node));
    }

    let lookup = |key: &str| -> Result<NodeRef, LoadError> {
        keys.get(key)
            .cloned()
            .ok_or_else(|| LoadError::UnknownKey(key.to_string()))
    };

    for edge in document.edges {
        let start = lookup(&edge.start)?;
        let end = lookup(&edge.end)?;
        graph.connect_with(&start, &end, edge.relation, edge.properties);
    }
    for root in &document.roots {
        let root = lookup(root)?;
        graph.mark_root(&root);
    }
    // Analysis and export only see what hangs off a root.
    if document.roots.is_empty() && !keys.is_empty() {
        return Err(LoadError::NoRoots(keys.len()));
    }

    Ok(LoadedGraph { graph, keys })
}
