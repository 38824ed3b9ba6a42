//! Graph Export
//!
//! Turns the program graph plus the analysis overlay into store statements
//! and submits them. Planning ([`GraphExporter::plan`]) is pure: it collects
//! the exportable nodes, assigns surrogate ids, applies the exclusion filter,
//! validates every label and relationship type, and groups rows into batches.
//! Execution ([`GraphExporter::execute`]) wipes the store and writes the plan:
//! node batches in parallel, then the id index, then relationship batches in
//! parallel. Any failed batch aborts the export.

use crate::domain::context::AnalysisContext;
use crate::domain::demangle::Demangler;
use crate::domain::identity::IdentityIndex;
use crate::domain::program::{NodeRef, ProgramGraph};
use crate::domain::schema;
use crate::domain::store::GraphStore;
use crate::error::ExportError;
use crate::infrastructure::concurrency;
use crate::infrastructure::config::ExportConfig;
use crate::ports::statement::{
    Identifier, NodeRow, PropertyMap, PropertyValue, RelationshipRow, Statement, ID_KEY,
};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub relationship_batch_size: usize,
    pub workers: usize,
    pub excluded_labels: BTreeSet<String>,
    pub excluded_relationships: BTreeSet<String>,
}

impl ExportOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            relationship_batch_size: config.effective_relationship_batch_size(),
            workers: config.effective_workers(),
            excluded_labels: config.effective_excluded_labels(),
            excluded_relationships: config.effective_excluded_relationships(),
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub nodes: usize,
    pub relationships: usize,
    pub node_batches: usize,
    pub relationship_batches: usize,
    pub dropped_nodes: usize,
    pub dropped_relationships: usize,
}

/// Validated statements ready for submission.
#[derive(Debug, Clone)]
pub struct ExportPlan {
    node_batches: Vec<Statement>,
    relationship_batches: Vec<Statement>,
    summary: ExportSummary,
}

impl ExportPlan {
    pub fn node_batches(&self) -> &[Statement] {
        &self.node_batches
    }

    pub fn relationship_batches(&self) -> &[Statement] {
        &self.relationship_batches
    }

    pub fn summary(&self) -> &ExportSummary {
        &self.summary
    }
}

pub struct GraphExporter {
    options: ExportOptions,
    demangle: Demangler,
}

/// Relationship rows grouped by type, unique on `(start, end, type)`.
#[derive(Default)]
struct RelationshipRows {
    keys: HashSet<(u64, u64, String)>,
    by_type: BTreeMap<String, Vec<RelationshipRow>>,
}

impl RelationshipRows {
    fn push(&mut self, start_id: u64, end_id: u64, rel_type: &str, properties: &BTreeMap<String, String>) {
        if !self.keys.insert((start_id, end_id, rel_type.to_string())) {
            return;
        }
        let properties = properties
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::from(v.as_str())))
            .collect();
        self.by_type
            .entry(rel_type.to_string())
            .or_default()
            .push(RelationshipRow {
                start_id,
                end_id,
                properties,
            });
    }
}

fn surrogate(identity: &IdentityIndex, node: &NodeRef) -> Result<u64, ExportError> {
    identity
        .get(node)
        .ok_or_else(|| ExportError::UnregisteredNode(format!("{node:?}")))
}

fn run(store: &dyn GraphStore, statement: &Statement) -> Result<(), ExportError> {
    debug!(target: "threadtrace::export", rows = statement.row_count(), statement = %statement.cypher(), "submit");
    store
        .execute(statement)
        .map_err(|source| ExportError::Transport {
            statement: statement.cypher(),
            source,
        })
}

impl GraphExporter {
    pub fn new(options: ExportOptions, demangle: Demangler) -> Self {
        Self { options, demangle }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Declared nodes, everything reachable from them through a persisted
    /// relationship field, and the endpoints of synthesized edges.
    fn exportable_nodes(graph: &ProgramGraph, ctx: &AnalysisContext) -> Vec<NodeRef> {
        let mut seen: HashSet<NodeRef> = HashSet::new();
        let mut order = Vec::new();
        let mut queue: VecDeque<NodeRef> = graph.ast_nodes().into();

        while let Some(node) = queue.pop_front() {
            if !seen.insert(node.clone()) {
                continue;
            }
            for &relation in schema::relationship_fields(node.kind) {
                for target in graph.targets(&node, relation) {
                    if !seen.contains(target) {
                        queue.push_back(target.clone());
                    }
                }
            }
            order.push(node);
        }

        for edge in ctx.synthesized.iter() {
            for endpoint in [&edge.start, &edge.end] {
                if seen.insert(endpoint.clone()) {
                    order.push(endpoint.clone());
                }
            }
        }

        order
    }

    fn node_row(&self, node: &NodeRef, id: u64, ctx: &AnalysisContext) -> NodeRow {
        let mut properties = PropertyMap::new();
        properties.insert("name".to_string(), PropertyValue::from((self.demangle)(&node.name)));
        if let Some(code) = &node.code {
            properties.insert("code".to_string(), PropertyValue::from(code.as_str()));
        }
        for (key, value) in &node.properties {
            properties.insert(key.clone(), PropertyValue::from(value.as_str()));
        }
        for (key, value) in ctx.annotations.properties(node) {
            properties.insert(key.to_string(), PropertyValue::from(value));
        }
        // `id` always carries the surrogate id.
        properties.insert(ID_KEY.to_string(), PropertyValue::from(id));
        NodeRow { properties }
    }

    pub fn plan(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> Result<ExportPlan, ExportError> {
        let started = Instant::now();
        let mut summary = ExportSummary::default();

        let nodes = Self::exportable_nodes(graph, ctx);
        {
            let identity = ctx.annotations.identity_mut();
            for node in &nodes {
                identity.surrogate_id(node);
            }
        }
        let ctx: &AnalysisContext = ctx;
        let identity = ctx.annotations.identity();

        let dropped: HashSet<NodeRef> = nodes
            .iter()
            .filter(|n| {
                self.options.excluded_labels.contains(n.kind.primary_label())
                    || ctx.annotations.is_scheduled_for_deletion(n)
            })
            .cloned()
            .collect();
        summary.dropped_nodes = dropped.len();

        // Nodes, one statement per distinct label set.
        let mut groups: BTreeMap<Vec<String>, Vec<NodeRow>> = BTreeMap::new();
        for node in nodes.iter().filter(|n| !dropped.contains(*n)) {
            let mut labels: BTreeSet<&str> = node.kind.labels().iter().copied().collect();
            labels.extend(ctx.annotations.labels(node));
            let key: Vec<String> = labels.into_iter().map(str::to_string).collect();
            let id = surrogate(identity, node)?;
            groups.entry(key).or_default().push(self.node_row(node, id, ctx));
            summary.nodes += 1;
        }
        let mut node_batches = Vec::with_capacity(groups.len());
        for (labels, rows) in groups {
            let labels = labels
                .iter()
                .map(|l| Identifier::new(l))
                .collect::<Result<Vec<_>, _>>()?;
            node_batches.push(Statement::CreateNodes { labels, rows });
        }

        // Relationships: schema fields first, then synthesized edges.
        let mut rows = RelationshipRows::default();
        // Edges leaving a dropped node are counted as dropped too.
        for node in &nodes {
            let start_dropped = dropped.contains(node);
            for &relation in schema::relationship_fields(node.kind) {
                for (_, edge) in graph.outgoing(node, relation) {
                    if start_dropped
                        || self.options.excluded_relationships.contains(relation.as_str())
                        || dropped.contains(&edge.end)
                    {
                        summary.dropped_relationships += 1;
                        continue;
                    }
                    let start_id = surrogate(identity, node)?;
                    let end_id = surrogate(identity, &edge.end)?;
                    rows.push(start_id, end_id, relation.as_str(), &edge.properties);
                }
            }
        }
        for edge in ctx.synthesized.iter() {
            if self.options.excluded_relationships.contains(&edge.rel_type)
                || dropped.contains(&edge.start)
                || dropped.contains(&edge.end)
            {
                summary.dropped_relationships += 1;
                continue;
            }
            let start_id = surrogate(identity, &edge.start)?;
            let end_id = surrogate(identity, &edge.end)?;
            rows.push(start_id, end_id, &edge.rel_type, &edge.properties);
        }

        let batch_size = self.options.relationship_batch_size.max(1);
        let mut relationship_batches = Vec::new();
        for (rel_type, group) in rows.by_type {
            let rel_type = Identifier::new(&rel_type)?;
            summary.relationships += group.len();
            for chunk in group.chunks(batch_size) {
                relationship_batches.push(Statement::MergeRelationships {
                    rel_type: rel_type.clone(),
                    rows: chunk.to_vec(),
                });
            }
        }

        summary.node_batches = node_batches.len();
        summary.relationship_batches = relationship_batches.len();
        info!(
            target: "threadtrace::export",
            nodes = summary.nodes,
            relationships = summary.relationships,
            dropped_nodes = summary.dropped_nodes,
            dropped_relationships = summary.dropped_relationships,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "export planned"
        );

        Ok(ExportPlan {
            node_batches,
            relationship_batches,
            summary,
        })
    }

    pub fn execute(&self, plan: &ExportPlan, store: &dyn GraphStore) -> Result<ExportSummary, ExportError> {
        let started = Instant::now();
        let pool = concurrency::build_export_pool(self.options.workers)?;

        run(store, &Statement::Wipe)?;
        pool.install(|| {
            plan.node_batches
                .par_iter()
                .try_for_each(|statement| run(store, statement))
        })?;
        run(store, &Statement::CreateIndex)?;
        pool.install(|| {
            plan.relationship_batches
                .par_iter()
                .try_for_each(|statement| run(store, statement))
        })?;

        info!(
            target: "threadtrace::export",
            node_batches = plan.summary.node_batches,
            relationship_batches = plan.summary.relationship_batches,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "export complete"
        );
        Ok(plan.summary.clone())
    }

    pub fn export(
        &self,
        graph: &ProgramGraph,
        ctx: &mut AnalysisContext,
        store: &dyn GraphStore,
    ) -> Result<ExportSummary, ExportError> {
        let plan = self.plan(graph, ctx)?;
        self.execute(&plan, store)
    }
}
