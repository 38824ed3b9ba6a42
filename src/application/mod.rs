use crate::domain::context::AnalysisContext;
use crate::domain::program::ProgramGraph;
use crate::domain::store::GraphStore;
use crate::infrastructure::exporter::{ExportSummary, GraphExporter};
use crate::infrastructure::passes::PassPipeline;
use anyhow::{Context, Result};
use tracing::info;

pub struct AnalyzeUsecase<'a> {
    pub pipeline: &'a PassPipeline,
    pub exporter: &'a GraphExporter,
    pub store: &'a dyn GraphStore,
}

pub struct AnalysisOutcome {
    pub context: AnalysisContext,
    pub summary: ExportSummary,
    /// False for a dry run: the plan was built but nothing was written.
    pub exported: bool,
}

impl<'a> AnalyzeUsecase<'a> {
    pub fn run(&self, graph: &ProgramGraph, dry_run: bool) -> Result<AnalysisOutcome> {
        let mut context = AnalysisContext::new();
        self.pipeline.run(graph, &mut context);
        info!(
            target: "threadtrace",
            annotated = context.annotations.annotated(),
            synthesized = context.synthesized.len(),
            "analysis complete"
        );

        let plan = self
            .exporter
            .plan(graph, &mut context)
            .context("failed to plan export")?;
        if dry_run {
            return Ok(AnalysisOutcome {
                summary: plan.summary().clone(),
                context,
                exported: false,
            });
        }

        let summary = self
            .exporter
            .execute(&plan, self.store)
            .context("export to graph store failed")?;
        Ok(AnalysisOutcome {
            context,
            summary,
            exported: true,
        })
    }
}
