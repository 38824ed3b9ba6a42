use crate::domain::annotation::properties;
use crate::domain::context::AnalysisContext;
use crate::domain::demangle::Demangler;
use crate::domain::program::{NodeKind, ProgramGraph, Relation};
use crate::ports::AnalysisPass;

/// Names each function scope after its (demangled) function.
pub struct ScopePass {
    pub demangle: Demangler,
}

impl AnalysisPass for ScopePass {
    fn name(&self) -> &'static str {
        "scope"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let mut named = 0;
        for function in graph.functions() {
            let scopes = graph
                .targets(function, Relation::Scope)
                .filter(|s| s.kind == NodeKind::FunctionScope);
            for scope in scopes {
                ctx.annotations
                    .set_property(scope, properties::NAME, (self.demangle)(&function.name));
                named += 1;
            }
        }
        named
    }
}
