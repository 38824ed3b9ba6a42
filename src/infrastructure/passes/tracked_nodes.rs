use crate::domain::annotation::labels;
use crate::domain::context::AnalysisContext;
use crate::domain::demangle::Demangler;
use crate::domain::program::{NodeKind, NodeRef, ProgramGraph};
use crate::ports::AnalysisPass;
use tracing::debug;

const DEBUG_DECLARE: &str = "llvm.dbg.declare";
const STD_PREFIXES: [&str; 3] = ["core::", "alloc::", "std::"];

/// Promotes variables described by `llvm.dbg.declare` to `TrackedNode`s and
/// drops the debug call itself from the export.
pub struct TrackedNodesPass {
    pub demangle: Demangler,
}

impl TrackedNodesPass {
    fn is_std(&self, function: &NodeRef) -> bool {
        let name = (self.demangle)(&function.name);
        STD_PREFIXES.iter().any(|p| name.starts_with(p))
    }

    /// `ptr %x` -> `x`
    fn register_name(argument: &NodeRef) -> Option<&str> {
        argument.code.as_deref()?.rsplit('%').next()
    }

    fn declared_variable(&self, graph: &ProgramGraph, call: &NodeRef, function: &NodeRef, name: &str) -> Option<NodeRef> {
        let in_block = graph.ast_parent(call).and_then(|block| {
            graph
                .flatten_ast(block)
                .into_iter()
                .find(|n| n.kind == NodeKind::VariableDeclaration && n.name == name)
        });
        in_block.or_else(|| graph.parameters(function).into_iter().find(|p| p.name == name))
    }
}

impl AnalysisPass for TrackedNodesPass {
    fn name(&self) -> &'static str {
        "tracked-nodes"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let mut tracked = 0;
        let calls = graph
            .ast_nodes()
            .into_iter()
            .filter(|n| n.kind == NodeKind::CallExpression && n.name.contains(DEBUG_DECLARE));

        for call in calls {
            let arguments = graph.arguments(&call);
            let Some(first) = arguments.first() else {
                continue;
            };
            let Some(function) = graph.enclosing_function(&call) else {
                continue;
            };
            if self.is_std(&function) {
                continue;
            }
            let Some(name) = Self::register_name(first) else {
                continue;
            };
            if name.contains("undef") {
                continue;
            }
            let Some(variable) = self.declared_variable(graph, &call, &function, name) else {
                debug!(target: "threadtrace::passes", register = name, "debug declare without a matching variable");
                continue;
            };

            ctx.annotations.add_label(&variable, labels::TRACKED_NODE);
            ctx.annotations.schedule_deletion(&call);
            ctx.annotations.schedule_deletions(arguments.iter());
            tracked += 1;
        }

        tracked
    }
}
