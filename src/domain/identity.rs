// Surrogate identity for externally-owned graph nodes.
// Ids are dense, assigned on first sight, and stable for the lifetime of the index.

use crate::domain::program::NodeRef;
use std::collections::HashMap;

pub type SurrogateId = u64;

#[derive(Debug, Default)]
pub struct IdentityIndex {
    ids: HashMap<NodeRef, SurrogateId>,
    order: Vec<NodeRef>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `node`, assigning the next free one on first call.
    pub fn surrogate_id(&mut self, node: &NodeRef) -> SurrogateId {
        if let Some(&id) = self.ids.get(node) {
            return id;
        }
        let id = self.order.len() as SurrogateId;
        self.ids.insert(node.clone(), id);
        self.order.push(node.clone());
        id
    }

    /// Id of `node` if it was already registered. Never assigns.
    pub fn get(&self, node: &NodeRef) -> Option<SurrogateId> {
        self.ids.get(node).copied()
    }

    /// Reverse lookup.
    pub fn node(&self, id: SurrogateId) -> Option<&NodeRef> {
        usize::try_from(id).ok().and_then(|i| self.order.get(i))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
