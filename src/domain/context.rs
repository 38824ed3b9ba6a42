//! Analysis Context
//!
//! Everything one run accumulates on top of the program graph. Passes borrow
//! it mutably in turn. Work belonging to one analysis unit (a spawn site, a
//! drop call) is staged in a [`SiteBuffer`] and lands in the context only on
//! [`SiteBuffer::commit`]; dropping the buffer discards it.

use crate::domain::annotation::AnnotationStore;
use crate::domain::program::NodeRef;
use crate::domain::synthesized::{SynthesizedEdge, SynthesizedEdges};

#[derive(Debug, Default)]
pub struct AnalysisContext {
    pub annotations: AnnotationStore,
    pub synthesized: SynthesizedEdges,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Staged writes of one analysis unit.
#[derive(Debug, Default)]
#[must_use = "a site buffer does nothing unless committed"]
pub struct SiteBuffer {
    edges: Vec<SynthesizedEdge>,
    labels: Vec<(NodeRef, String)>,
    properties: Vec<(NodeRef, String, String)>,
}

impl SiteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, start: &NodeRef, end: &NodeRef, rel_type: &str) {
        self.edges.push(SynthesizedEdge::new(start, end, rel_type));
    }

    pub fn add_label(&mut self, node: &NodeRef, label: &str) {
        self.labels.push((node.clone(), label.to_string()));
    }

    pub fn set_property(&mut self, node: &NodeRef, key: &str, value: impl Into<String>) {
        self.properties
            .push((node.clone(), key.to_string(), value.into()));
    }

    /// Latest staged value of `key` on `node`.
    pub fn pending_property(&self, node: &NodeRef, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .rev()
            .find(|(n, k, _)| n == node && k == key)
            .map(|(_, _, v)| v.as_str())
    }

    pub fn edges(&self) -> &[SynthesizedEdge] {
        &self.edges
    }

    /// Apply every staged write in staging order. Returns the number of
    /// edges that were new to the context.
    pub fn commit(self, ctx: &mut AnalysisContext) -> usize {
        for (node, label) in self.labels {
            ctx.annotations.add_label(&node, label);
        }
        for (node, key, value) in self.properties {
            ctx.annotations.set_property(&node, key, value);
        }
        let mut added = 0;
        for edge in self.edges {
            let identity = ctx.annotations.identity_mut();
            identity.surrogate_id(&edge.start);
            identity.surrogate_id(&edge.end);
            if ctx.synthesized.insert(edge) {
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::{Node, NodeKind, ProgramGraph};

    #[test]
    fn test_dropped_buffer_leaves_context_untouched() {
        let mut graph = ProgramGraph::new();
        let a = graph.add_node(Node::new(NodeKind::FunctionDeclaration, "a"));
        let b = graph.add_node(Node::new(NodeKind::FunctionDeclaration, "b"));
        let ctx = AnalysisContext::new();

        {
            let mut buffer = SiteBuffer::new();
            buffer.add_label(&a, "X");
            buffer.connect(&a, &b, "E");
            drop(buffer);
        }

        assert!(!ctx.annotations.has_label(&a, "X"));
        assert!(ctx.synthesized.is_empty());
    }

    #[test]
    fn test_commit_applies_everything() {
        let mut graph = ProgramGraph::new();
        let a = graph.add_node(Node::new(NodeKind::FunctionDeclaration, "a"));
        let b = graph.add_node(Node::new(NodeKind::FunctionDeclaration, "b"));
        let mut ctx = AnalysisContext::new();

        let mut buffer = SiteBuffer::new();
        buffer.add_label(&a, "X");
        buffer.set_property(&b, "k", "old");
        buffer.set_property(&b, "k", "new");
        assert_eq!(buffer.pending_property(&b, "k"), Some("new"));
        buffer.connect(&a, &b, "E");
        buffer.connect(&a, &b, "E");

        assert_eq!(buffer.commit(&mut ctx), 1);
        assert!(ctx.annotations.has_label(&a, "X"));
        assert_eq!(ctx.annotations.property(&b, "k"), Some("new"));
        assert!(ctx.synthesized.has_relationship(&a, &b, "E"));
    }
}
