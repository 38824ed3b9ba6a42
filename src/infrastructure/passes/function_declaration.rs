// The frontend stores a function's whole body as its `code`. Keep the header only.

use crate::domain::annotation::properties;
use crate::domain::context::AnalysisContext;
use crate::domain::program::{NodeRef, ProgramGraph};
use crate::ports::AnalysisPass;

const ATTRS_HEADER: &str = "; Function Attrs";
const FUNCTION_HEADERS: [&str; 3] = [ATTRS_HEADER, "define", "declare"];

pub struct FunctionDeclarationPass;

/// `define i32 @f(i32 %a) #0 {\n...}` -> `define i32 @f(i32 %a) #0 `
pub fn function_header(code: &str) -> Option<&str> {
    if !FUNCTION_HEADERS.iter().any(|h| code.starts_with(h)) {
        return None;
    }
    let head = code.split('{').next().unwrap_or(code);
    if head.starts_with(ATTRS_HEADER) {
        return Some(head.split('\n').nth(1).unwrap_or(""));
    }
    Some(head)
}

fn update_code(node: &NodeRef, ctx: &mut AnalysisContext) -> bool {
    match node.code.as_deref().and_then(function_header) {
        Some(header) => {
            ctx.annotations.set_property(node, properties::CODE, header);
            true
        }
        None => false,
    }
}

impl AnalysisPass for FunctionDeclarationPass {
    fn name(&self) -> &'static str {
        "function-declaration"
    }

    fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> usize {
        let mut updated = 0;
        for function in graph.functions() {
            if update_code(function, ctx) {
                updated += 1;
            }
            for reference in graph.usages(function) {
                if update_code(&reference, ctx) {
                    updated += 1;
                }
            }
        }
        updated
    }
}
