// Flags calls emitted on an unwind cleanup path.
// The frontend keeps operand bundles only in the instruction text:
//   call void @drop(ptr %b) #9 [ "funclet"(token %cleanuppad) ]

use crate::domain::annotation::MetadataKey;
use crate::domain::context::AnalysisContext;
use crate::domain::program::{NodeKind, ProgramGraph};
use crate::ports::AnalysisPass;

const FUNCLET_BUNDLE: &str = "\"funclet\"(";

pub struct FuncletPass;

impl AnalysisPass for FuncletPass {
    fn name(&self) -> &'static str {
        "funclet"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let mut flagged = 0;
        for call in graph.ast_nodes() {
            if call.kind != NodeKind::CallExpression {
                continue;
            }
            if call.code.as_deref().is_some_and(|c| c.contains(FUNCLET_BUNDLE)) {
                ctx.annotations.set_metadata(&call, MetadataKey::HasFuncletInfo, "");
                flagged += 1;
            }
        }
        flagged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::program::{Node, Relation};

    #[test]
    fn test_only_bundled_calls_are_flagged() {
        let mut graph = ProgramGraph::new();
        let tu = graph.add_root(Node::new(NodeKind::TranslationUnitDeclaration, "m.ll"));
        let cleanup = graph.add_child(
            &tu,
            Relation::Declarations,
            Node::new(NodeKind::CallExpression, "drop").with_code("call void @drop(ptr %b) #9 [ \"funclet\"(token %cleanuppad) ]"),
        );
        let plain = graph.add_child(
            &tu,
            Relation::Declarations,
            Node::new(NodeKind::CallExpression, "drop").with_code("call void @drop(ptr %b)"),
        );
        let mut ctx = AnalysisContext::new();

        assert_eq!(FuncletPass.run(&graph, &mut ctx), 1);
        assert!(ctx.annotations.metadata(&cleanup, MetadataKey::HasFuncletInfo).is_some());
        assert!(ctx.annotations.metadata(&plain, MetadataKey::HasFuncletInfo).is_none());
    }
}
