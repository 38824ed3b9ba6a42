//! Annotation Overlay
//!
//! Labels, properties and metadata flags attached to graph nodes without
//! touching the nodes themselves. All state is keyed by surrogate id; writes
//! register the node implicitly and reads on unknown nodes come back empty.

use crate::domain::identity::{IdentityIndex, SurrogateId};
use crate::domain::program::NodeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Labels written by the analysis passes.
pub mod labels {
    pub const MAIN_FUNCTION: &str = "MainFunctionDeclaration";
    pub const THREAD_SPAWN: &str = "ThreadSpawnDeclaration";
    pub const THREAD_START: &str = "ThreadStartDeclaration";
    pub const TRACKED_NODE: &str = "TrackedNode";
}

/// Property keys written by the analysis passes.
pub mod properties {
    pub const THREAD_USE: &str = "THREAD_USE";
    pub const SHARED: &str = "SHARED";
    pub const THREAD: &str = "thread";
    pub const THREAD_CONTEXT: &str = "thread_context";
    pub const CODE: &str = "code";
    pub const NAME: &str = "name";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetadataKey {
    /// The call carries a `funclet` operand bundle (unwind cleanup path).
    HasFuncletInfo,
}

#[derive(Debug, Clone, Default)]
struct Annotation {
    labels: BTreeSet<String>,
    properties: BTreeMap<String, String>,
    metadata: BTreeMap<MetadataKey, String>,
    delete_scheduled: bool,
}

#[derive(Debug, Default)]
pub struct AnnotationStore {
    identity: IdentityIndex,
    entries: HashMap<SurrogateId, Annotation>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> &IdentityIndex {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut IdentityIndex {
        &mut self.identity
    }

    fn entry(&mut self, node: &NodeRef) -> &mut Annotation {
        let id = self.identity.surrogate_id(node);
        self.entries.entry(id).or_default()
    }

    fn lookup(&self, node: &NodeRef) -> Option<&Annotation> {
        self.identity.get(node).and_then(|id| self.entries.get(&id))
    }

    // ----------------------------------------------------------------- labels

    pub fn add_label(&mut self, node: &NodeRef, label: impl Into<String>) {
        self.entry(node).labels.insert(label.into());
    }

    pub fn add_labels<I, S>(&mut self, node: &NodeRef, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.entry(node);
        entry.labels.extend(labels.into_iter().map(Into::into));
    }

    pub fn has_label(&self, node: &NodeRef, label: &str) -> bool {
        self.lookup(node).is_some_and(|a| a.labels.contains(label))
    }

    pub fn has_any(&self, node: &NodeRef, labels: &[&str]) -> bool {
        self.lookup(node)
            .is_some_and(|a| labels.iter().any(|l| a.labels.contains(*l)))
    }

    /// True when the node carries every label in `labels`. Unregistered nodes
    /// carry nothing, so this is false for them even with an empty query.
    pub fn has_all(&self, node: &NodeRef, labels: &[&str]) -> bool {
        self.lookup(node)
            .is_some_and(|a| labels.iter().all(|l| a.labels.contains(*l)))
    }

    pub fn labels<'a>(&'a self, node: &NodeRef) -> impl Iterator<Item = &'a str> + 'a {
        self.lookup(node)
            .into_iter()
            .flat_map(|a| a.labels.iter().map(String::as_str))
    }

    // ------------------------------------------------------------- properties

    pub fn set_property(&mut self, node: &NodeRef, key: impl Into<String>, value: impl Into<String>) {
        self.entry(node).properties.insert(key.into(), value.into());
    }

    pub fn property(&self, node: &NodeRef, key: &str) -> Option<&str> {
        self.lookup(node)
            .and_then(|a| a.properties.get(key))
            .map(String::as_str)
    }

    pub fn has_property(&self, node: &NodeRef, key: &str) -> bool {
        self.property(node, key).is_some()
    }

    pub fn properties<'a>(&'a self, node: &NodeRef) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.lookup(node)
            .into_iter()
            .flat_map(|a| a.properties.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    // --------------------------------------------------------------- metadata

    pub fn set_metadata(&mut self, node: &NodeRef, key: MetadataKey, value: impl Into<String>) {
        self.entry(node).metadata.insert(key, value.into());
    }

    pub fn metadata(&self, node: &NodeRef, key: MetadataKey) -> Option<&str> {
        self.lookup(node)
            .and_then(|a| a.metadata.get(&key))
            .map(String::as_str)
    }

    // --------------------------------------------------------------- deletion

    /// Mark `node` for exclusion at export time. The graph is left untouched.
    pub fn schedule_deletion(&mut self, node: &NodeRef) {
        self.entry(node).delete_scheduled = true;
    }

    pub fn schedule_deletions<'n>(&mut self, nodes: impl IntoIterator<Item = &'n NodeRef>) {
        for node in nodes {
            self.schedule_deletion(node);
        }
    }

    pub fn is_scheduled_for_deletion(&self, node: &NodeRef) -> bool {
        self.lookup(node).is_some_and(|a| a.delete_scheduled)
    }

    // ------------------------------------------------------------------ misc

    /// Number of nodes carrying an annotation.
    pub fn annotated(&self) -> usize {
        self.entries.len()
    }

    /// Drop every annotation. Surrogate ids survive.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
