//! Program Graph Model
//!
//! In-process view of the externally produced program graph. Nodes are
//! immutable once added and are handed out as [`NodeRef`] handles that compare
//! and hash by identity. Host-provided ids are carried along but never used as
//! identity: the frontend is known to repeat them across distinct nodes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Classification of graph nodes, as produced by the IR frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    TranslationUnitDeclaration,
    FunctionDeclaration,
    ParameterDeclaration,
    VariableDeclaration,
    Block,
    CallExpression,
    Reference,
    Literal,
    UnaryOperator,
    AssignExpression,
    NewArrayExpression,
    InitializerListExpression,
    Expression,
    FunctionScope,
    LocalScope,
    #[serde(rename = "LLVMIRLanguage")]
    LlvmIrLanguage,
    ObjectType,
    UnknownType,
}

impl NodeKind {
    /// Static label set, most specific label first.
    pub fn labels(self) -> &'static [&'static str] {
        use NodeKind::*;
        match self {
            TranslationUnitDeclaration => &["TranslationUnitDeclaration", "Declaration", "Node"],
            FunctionDeclaration => &["FunctionDeclaration", "ValueDeclaration", "Declaration", "Node"],
            ParameterDeclaration => &["ParameterDeclaration", "ValueDeclaration", "Declaration", "Node"],
            VariableDeclaration => &["VariableDeclaration", "ValueDeclaration", "Declaration", "Node"],
            Block => &["Block", "Expression", "Statement", "Node"],
            CallExpression => &["CallExpression", "Expression", "Statement", "Node"],
            Reference => &["Reference", "Expression", "Statement", "Node"],
            Literal => &["Literal", "Expression", "Statement", "Node"],
            UnaryOperator => &["UnaryOperator", "Expression", "Statement", "Node"],
            AssignExpression => &["AssignExpression", "Expression", "Statement", "Node"],
            NewArrayExpression => &["NewArrayExpression", "Expression", "Statement", "Node"],
            InitializerListExpression => &["InitializerListExpression", "Expression", "Statement", "Node"],
            Expression => &["Expression", "Statement", "Node"],
            FunctionScope => &["FunctionScope", "Scope", "Node"],
            LocalScope => &["LocalScope", "Scope", "Node"],
            LlvmIrLanguage => &["LLVMIRLanguage", "Language", "Node"],
            ObjectType => &["ObjectType", "Type", "Node"],
            UnknownType => &["UnknownType", "Type", "Node"],
        }
    }

    pub fn primary_label(self) -> &'static str {
        self.labels()[0]
    }

    /// Store or compound-mutation nodes (`*p += 1`, `x = y`).
    pub fn is_mutation(self) -> bool {
        matches!(self, NodeKind::UnaryOperator | NodeKind::AssignExpression)
    }
}

/// How a reference touches the declaration it refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

/// A program-graph entity. Owned by the graph, never mutated after insertion.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Local name as emitted by the frontend (usually mangled).
    pub name: String,
    pub code: Option<String>,
    /// Frontend id; not unique.
    pub host_id: Option<u64>,
    pub access: Option<AccessKind>,
    pub properties: BTreeMap<String, String>,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            code: None,
            host_id: None,
            access: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_host_id(mut self, id: u64) -> Self {
        self.host_id = Some(id);
        self
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = Some(access);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Identity handle to a [`Node`]. Equality and hashing use the allocation
/// address, so two structurally equal nodes are still distinct.
#[derive(Clone)]
pub struct NodeRef(Arc<Node>);

impl NodeRef {
    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl Deref for NodeRef {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.primary_label(), self.name)
    }
}

/// Broad edge families of the source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Ast,
    ControlFlow,
    DataFlow,
    Call,
    Reference,
    Auxiliary,
}

/// Relationship field names, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    Declarations,
    Parameters,
    Body,
    Statements,
    Arguments,
    Initializer,
    Input,
    Eog,
    Dfg,
    Invokes,
    RefersTo,
    Scope,
    Type,
    Language,
}

impl Relation {
    pub fn as_str(self) -> &'static str {
        match self {
            Relation::Declarations => "DECLARATIONS",
            Relation::Parameters => "PARAMETERS",
            Relation::Body => "BODY",
            Relation::Statements => "STATEMENTS",
            Relation::Arguments => "ARGUMENTS",
            Relation::Initializer => "INITIALIZER",
            Relation::Input => "INPUT",
            Relation::Eog => "EOG",
            Relation::Dfg => "DFG",
            Relation::Invokes => "INVOKES",
            Relation::RefersTo => "REFERS_TO",
            Relation::Scope => "SCOPE",
            Relation::Type => "TYPE",
            Relation::Language => "LANGUAGE",
        }
    }

    pub fn kind(self) -> EdgeKind {
        match self {
            Relation::Declarations
            | Relation::Parameters
            | Relation::Body
            | Relation::Statements
            | Relation::Arguments
            | Relation::Initializer
            | Relation::Input => EdgeKind::Ast,
            Relation::Eog => EdgeKind::ControlFlow,
            Relation::Dfg => EdgeKind::DataFlow,
            Relation::Invokes => EdgeKind::Call,
            Relation::RefersTo => EdgeKind::Reference,
            Relation::Scope | Relation::Type | Relation::Language => EdgeKind::Auxiliary,
        }
    }

    pub fn is_ast(self) -> bool {
        self.kind() == EdgeKind::Ast
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// A directed, typed edge of the source graph.
#[derive(Debug, Clone)]
pub struct Edge {
    pub relation: Relation,
    pub start: NodeRef,
    pub end: NodeRef,
    pub properties: BTreeMap<String, String>,
}

/// The program graph handed over by the frontend.
#[derive(Debug, Default)]
pub struct ProgramGraph {
    nodes: Vec<NodeRef>,
    roots: Vec<NodeRef>,
    edges: Vec<Edge>,
    outgoing: HashMap<NodeRef, Vec<EdgeId>>,
    incoming: HashMap<NodeRef, Vec<EdgeId>>,
    functions_by_name: HashMap<String, Vec<NodeRef>>,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> NodeRef {
        let node = NodeRef(Arc::new(node));
        if node.kind == NodeKind::FunctionDeclaration {
            self.functions_by_name
                .entry(node.name.clone())
                .or_default()
                .push(node.clone());
        }
        self.nodes.push(node.clone());
        node
    }

    /// Add a node and mark it as an AST root (a translation unit).
    pub fn add_root(&mut self, node: Node) -> NodeRef {
        let node = self.add_node(node);
        self.roots.push(node.clone());
        node
    }

    pub fn mark_root(&mut self, node: &NodeRef) {
        if !self.roots.contains(node) {
            self.roots.push(node.clone());
        }
    }

    /// Add `node` and connect it below `parent` through `relation`.
    pub fn add_child(&mut self, parent: &NodeRef, relation: Relation, node: Node) -> NodeRef {
        let node = self.add_node(node);
        self.connect(parent, &node, relation);
        node
    }

    pub fn connect(&mut self, start: &NodeRef, end: &NodeRef, relation: Relation) -> EdgeId {
        self.connect_with(start, end, relation, BTreeMap::new())
    }

    pub fn connect_with(
        &mut self,
        start: &NodeRef,
        end: &NodeRef,
        relation: Relation,
        properties: BTreeMap<String, String>,
    ) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            relation,
            start: start.clone(),
            end: end.clone(),
            properties,
        });
        self.outgoing.entry(start.clone()).or_default().push(id);
        self.incoming.entry(end.clone()).or_default().push(id);
        id
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn roots(&self) -> &[NodeRef] {
        &self.roots
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// All outgoing edges of `node`, in insertion order.
    pub fn edges_from<'a>(&'a self, node: &NodeRef) -> impl Iterator<Item = (EdgeId, &'a Edge)> + 'a {
        self.outgoing
            .get(node)
            .into_iter()
            .flatten()
            .map(move |&id| (id, &self.edges[id.0]))
    }

    pub fn outgoing<'a>(
        &'a self,
        node: &NodeRef,
        relation: Relation,
    ) -> impl Iterator<Item = (EdgeId, &'a Edge)> + 'a {
        self.edges_from(node).filter(move |(_, e)| e.relation == relation)
    }

    pub fn incoming<'a>(
        &'a self,
        node: &NodeRef,
        relation: Relation,
    ) -> impl Iterator<Item = (EdgeId, &'a Edge)> + 'a {
        self.incoming
            .get(node)
            .into_iter()
            .flatten()
            .map(move |&id| (id, &self.edges[id.0]))
            .filter(move |(_, e)| e.relation == relation)
    }

    pub fn targets<'a>(&'a self, node: &NodeRef, relation: Relation) -> impl Iterator<Item = &'a NodeRef> + 'a {
        self.outgoing(node, relation).map(|(_, e)| &e.end)
    }

    pub fn ast_children(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.edges_from(node)
            .filter(|(_, e)| e.relation.is_ast())
            .map(|(_, e)| e.end.clone())
            .collect()
    }

    pub fn ast_parent(&self, node: &NodeRef) -> Option<&NodeRef> {
        self.incoming
            .get(node)?
            .iter()
            .map(|id| &self.edges[id.0])
            .find(|e| e.relation.is_ast())
            .map(|e| &e.start)
    }

    /// Pre-order AST walk below `root` (inclusive).
    pub fn flatten_ast(&self, root: &NodeRef) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            let children = self.ast_children(&node);
            out.push(node);
            stack.extend(children.into_iter().rev());
        }

        out
    }

    /// Every node reachable through AST edges from a root.
    pub fn ast_nodes(&self) -> Vec<NodeRef> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for root in &self.roots {
            for node in self.flatten_ast(root) {
                if seen.insert(node.clone()) {
                    out.push(node);
                }
            }
        }
        out
    }

    pub fn blocks(&self, function: &NodeRef) -> Vec<NodeRef> {
        self.targets(function, Relation::Body)
            .filter(|n| n.kind == NodeKind::Block)
            .cloned()
            .collect()
    }

    /// Call expressions of `function`, in block iteration order.
    pub fn calls(&self, function: &NodeRef) -> Vec<NodeRef> {
        self.blocks(function)
            .iter()
            .flat_map(|block| self.flatten_ast(block))
            .filter(|n| n.kind == NodeKind::CallExpression)
            .collect()
    }

    /// References found in the AST below `node` (inclusive), in walk order.
    pub fn references_within(&self, node: &NodeRef) -> Vec<NodeRef> {
        self.flatten_ast(node)
            .into_iter()
            .filter(|n| n.kind == NodeKind::Reference)
            .collect()
    }

    pub fn arguments(&self, call: &NodeRef) -> Vec<NodeRef> {
        self.targets(call, Relation::Arguments).cloned().collect()
    }

    pub fn parameters(&self, function: &NodeRef) -> Vec<NodeRef> {
        self.targets(function, Relation::Parameters).cloned().collect()
    }

    pub fn invoked(&self, call: &NodeRef) -> Option<&NodeRef> {
        self.targets(call, Relation::Invokes).next()
    }

    pub fn refers_to(&self, reference: &NodeRef) -> Option<&NodeRef> {
        self.targets(reference, Relation::RefersTo).next()
    }

    /// References pointing at `declaration`.
    pub fn usages(&self, declaration: &NodeRef) -> Vec<NodeRef> {
        self.incoming(declaration, Relation::RefersTo)
            .map(|(_, e)| e.start.clone())
            .collect()
    }

    pub fn write_usage(&self, declaration: &NodeRef) -> Option<NodeRef> {
        self.usages(declaration)
            .into_iter()
            .find(|r| r.access == Some(AccessKind::Write))
    }

    /// Nearest function declaration above `node` in the AST.
    pub fn enclosing_function(&self, node: &NodeRef) -> Option<NodeRef> {
        let mut seen = HashSet::new();
        let mut current = self.ast_parent(node)?.clone();
        loop {
            if current.kind == NodeKind::FunctionDeclaration {
                return Some(current);
            }
            if !seen.insert(current.clone()) {
                return None;
            }
            current = self.ast_parent(&current)?.clone();
        }
    }

    pub fn function_named(&self, mangled: &str) -> Option<&NodeRef> {
        self.functions_by_name.get(mangled).and_then(|v| v.first())
    }

    pub fn functions(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKind::FunctionDeclaration)
    }

    /// Resolve the function a call targets: the INVOKES edge when the
    /// frontend produced one, otherwise a declaration with the same symbol.
    pub fn callee(&self, call: &NodeRef) -> Option<NodeRef> {
        self.invoked(call)
            .filter(|f| f.kind == NodeKind::FunctionDeclaration)
            .or_else(|| self.function_named(&call.name))
            .cloned()
    }
}
