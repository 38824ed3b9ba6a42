//! Backward Dataflow Resolution
//!
//! Given the value handed to a spawn call, walk data-flow edges backward until
//! the value's origin is found: a literal, or the write that produced it.
//!
//! The walk is iterative and carries an explicit visited set, so cyclic DFG
//! shapes (self-loops, store/load pairs that feed each other) always terminate.
//! Every visited node is reported, whether or not a terminal was found.

use crate::domain::annotation::{properties, AnnotationStore};
use crate::domain::context::SiteBuffer;
use crate::domain::identity::IdentityIndex;
use crate::domain::program::{AccessKind, EdgeId, NodeKind, NodeRef, ProgramGraph, Relation};
use std::collections::HashSet;
use tracing::debug;

/// Outcome of one backward walk.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// The literal or write-site the value originates from, if one was reached.
    pub terminal: Option<NodeRef>,
    /// Nodes touched by the walk, in visit order, origin first.
    pub visited: Vec<NodeRef>,
    /// Number of hops where more than one predecessor qualified.
    pub ambiguous: usize,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.terminal.is_some()
    }
}

/// A step of the walk: the node to visit and the edge used to reach it.
struct Hop {
    node: NodeRef,
    via: Option<EdgeId>,
}

pub struct DataflowResolver<'g> {
    graph: &'g ProgramGraph,
}

impl<'g> DataflowResolver<'g> {
    pub fn new(graph: &'g ProgramGraph) -> Self {
        Self { graph }
    }

    /// Walk backward from `origin`. Candidate predecessors are registered in
    /// `identity` so that multi-candidate hops pick deterministically (lowest
    /// surrogate id).
    pub fn resolve(&self, origin: &NodeRef, identity: &mut IdentityIndex) -> Resolution {
        let mut resolution = Resolution::default();
        let mut seen: HashSet<NodeRef> = HashSet::new();
        let mut hop = Hop {
            node: origin.clone(),
            via: None,
        };

        loop {
            let current = hop.node.clone();
            if seen.insert(current.clone()) {
                resolution.visited.push(current.clone());
            }

            if current.kind == NodeKind::Literal {
                debug!(target: "threadtrace::dataflow", node = ?current, "reached literal");
                resolution.terminal = Some(current);
                break;
            }

            // Store / compound mutation: continue on the other operand.
            if current.kind.is_mutation() {
                let others: Vec<(EdgeId, NodeRef)> = self
                    .graph
                    .incoming(&current, Relation::Dfg)
                    .filter(|(id, e)| Some(*id) != hop.via && e.start != current)
                    .filter(|(_, e)| !seen.contains(&e.start))
                    .map(|(id, e)| (id, e.start.clone()))
                    .collect();
                if let [(id, start)] = others.as_slice() {
                    hop = Hop {
                        node: start.clone(),
                        via: Some(*id),
                    };
                    continue;
                }
            }

            let candidates: Vec<(EdgeId, NodeRef)> = self
                .graph
                .incoming(&current, Relation::Dfg)
                .filter(|(_, e)| e.start != current)
                .filter(|(_, e)| e.start.kind != NodeKind::NewArrayExpression)
                .filter(|(_, e)| !seen.contains(&e.start))
                .map(|(id, e)| (id, e.start.clone()))
                .collect();

            // A variable binding prefers its write-occurrence over plain candidates.
            if current.kind == NodeKind::VariableDeclaration {
                match self.graph.write_usage(&current) {
                    Some(write) if !seen.contains(&write) => {
                        hop = Hop {
                            node: write,
                            via: None,
                        };
                        continue;
                    }
                    Some(_) => {}
                    None if candidates.is_empty() => {
                        debug!(target: "threadtrace::dataflow", node = ?current, "binding without write occurrence");
                        break;
                    }
                    None => {}
                }
            }

            if candidates.is_empty() {
                // A write-occurrence feeding a mutation (`*p += 1`) has no
                // backward edge of its own; hop forward onto the mutation.
                if current.kind == NodeKind::Reference && current.access == Some(AccessKind::Write) {
                    if let Some(next) = self.forward_mutation(&current, &seen) {
                        hop = next;
                        continue;
                    }
                }
                debug!(target: "threadtrace::dataflow", node = ?current, "no predecessor");
                break;
            }

            if candidates.len() > 1 {
                resolution.ambiguous += 1;
                debug!(
                    target: "threadtrace::dataflow",
                    node = ?current,
                    candidates = candidates.len(),
                    "ambiguous predecessor, taking lowest surrogate id"
                );
            }
            let chosen = candidates
                .into_iter()
                .min_by_key(|(_, start)| identity.surrogate_id(start));
            match chosen {
                Some((id, start)) => {
                    hop = Hop {
                        node: start,
                        via: Some(id),
                    }
                }
                None => break,
            }
        }

        resolution
    }

    fn forward_mutation(&self, write: &NodeRef, seen: &HashSet<NodeRef>) -> Option<Hop> {
        self.graph
            .outgoing(write, Relation::Dfg)
            .find(|(_, e)| e.end != *write && e.end.kind.is_mutation() && !seen.contains(&e.end))
            .map(|(id, e)| Hop {
                node: e.end.clone(),
                via: Some(id),
            })
    }
}

/// Stage `THREAD_USE` tags for every node of `resolution`: `T<ctx>` for nodes
/// not yet tagged, `SHARED` for nodes already tagged by another context.
pub fn tag_thread_use(
    resolution: &Resolution,
    context: u32,
    annotations: &AnnotationStore,
    buffer: &mut SiteBuffer,
) {
    let tag = format!("T{context}");
    for node in &resolution.visited {
        let existing = buffer
            .pending_property(node, properties::THREAD_USE)
            .or_else(|| annotations.property(node, properties::THREAD_USE));
        let value = match existing {
            None => tag.as_str(),
            Some(current) if current == tag => continue,
            Some(_) => properties::SHARED,
        };
        buffer.set_property(node, properties::THREAD_USE, value);
    }
}
