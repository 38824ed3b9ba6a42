use crate::domain::annotation::MetadataKey;
use crate::domain::context::{AnalysisContext, SiteBuffer};
use crate::domain::demangle::Demangler;
use crate::domain::program::{NodeKind, ProgramGraph};
use crate::domain::synthesized::DROP_CALL;
use crate::ports::AnalysisPass;
use tracing::debug;

const FREE_IDENTIFIERS: [&str; 1] = ["core::ptr::drop_in_place"];

/// Links every drop call on the normal path to the values it frees.
/// Cleanup-path drops (funclet calls) duplicate the normal one and are skipped.
pub struct MemorySpacePass {
    pub demangle: Demangler,
}

impl AnalysisPass for MemorySpacePass {
    fn name(&self) -> &'static str {
        "memory-space"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let mut committed = 0;
        for call in graph.ast_nodes() {
            if call.kind != NodeKind::CallExpression {
                continue;
            }
            let name = (self.demangle)(&call.name);
            if !FREE_IDENTIFIERS.iter().any(|p| name.starts_with(p)) {
                continue;
            }
            if ctx.annotations.metadata(&call, MetadataKey::HasFuncletInfo).is_some() {
                continue;
            }

            let mut buffer = SiteBuffer::new();
            for argument in graph.arguments(&call) {
                buffer.connect(&call, &argument, DROP_CALL);
            }
            debug!(target: "threadtrace::passes", call = %name, edges = buffer.edges().len(), "drop call");
            buffer.commit(ctx);
            committed += 1;
        }
        committed
    }
}
