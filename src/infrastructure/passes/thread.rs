use crate::domain::chain::ThreadAnalysis;
use crate::domain::context::AnalysisContext;
use crate::domain::program::ProgramGraph;
use crate::ports::AnalysisPass;
use tracing::info;

/// Last pass of the standard pipeline.
pub struct ThreadPass {
    pub analysis: ThreadAnalysis,
}

impl AnalysisPass for ThreadPass {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let report = self.analysis.run(graph, ctx);
        info!(
            target: "threadtrace::passes",
            spawn_sites = report.spawn_sites,
            resolved = report.resolved,
            failed = report.failed,
            moved_values = report.moved_values_resolved,
            "thread analysis finished"
        );
        report.resolved
    }
}
