use crate::domain::context::AnalysisContext;
use crate::domain::program::ProgramGraph;

pub mod statement;

/// One stage of the analysis pipeline. Passes run sequentially over the same
/// graph and accumulate their results in the shared context.
pub trait AnalysisPass {
    fn name(&self) -> &'static str;

    /// Returns the number of analysis units the pass committed.
    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize;
}
