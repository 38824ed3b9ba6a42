// Analysis passes over the program graph, run in a fixed order.

pub mod funclet;
pub mod function_declaration;
pub mod memory_space;
pub mod scope;
pub mod thread;
pub mod tracked_nodes;

use crate::domain::chain::{ChainTracer, ThreadAnalysis};
use crate::domain::context::AnalysisContext;
use crate::domain::demangle::Demangler;
use crate::domain::program::ProgramGraph;
use crate::error::ChainError;
use crate::infrastructure::config::AnalysisConfig;
use crate::ports::AnalysisPass;
use tracing::{debug, info_span};

pub use funclet::FuncletPass;
pub use function_declaration::FunctionDeclarationPass;
pub use memory_space::MemorySpacePass;
pub use scope::ScopePass;
pub use thread::ThreadPass;
pub use tracked_nodes::TrackedNodesPass;

pub struct PassPipeline {
    passes: Vec<Box<dyn AnalysisPass>>,
}

impl PassPipeline {
    pub fn new(passes: Vec<Box<dyn AnalysisPass>>) -> Self {
        Self { passes }
    }

    /// Tracked nodes, funclet, memory space, function declaration, scope, thread.
    /// Funclet metadata must exist before drop calls are linked; the thread pass
    /// goes last.
    pub fn standard(config: &AnalysisConfig, demangle: Demangler) -> Result<Self, ChainError> {
        let tracer = ChainTracer::new(
            config.effective_chain()?,
            config.effective_intrinsic_prefixes(),
            demangle,
        );
        let analysis = ThreadAnalysis {
            tracer,
            entry_symbol: config.effective_entry_symbol(),
            spawn_symbol: config.effective_spawn_symbol(),
        };

        Ok(Self::new(vec![
            Box::new(TrackedNodesPass { demangle }),
            Box::new(FuncletPass),
            Box::new(MemorySpacePass { demangle }),
            Box::new(FunctionDeclarationPass),
            Box::new(ScopePass { demangle }),
            Box::new(ThreadPass { analysis }),
        ]))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) {
        for pass in &self.passes {
            let _span = info_span!("pass", name = pass.name()).entered();
            let units = pass.run(graph, ctx);
            debug!(target: "threadtrace::passes", pass = pass.name(), units, "pass finished");
        }
    }
}
