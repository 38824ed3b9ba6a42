//! Thread-Spawn Chain Tracing
//!
//! Rust's `std::thread::spawn` never calls the user closure directly: the call
//! goes through the builder, a boxed `FnOnce` vtable shim, `catch_unwind` and
//! the `__rust_try` intrinsic before the closure body runs. The tracer follows
//! a fixed description of that lowering ([`ChainSpec`]) one frame at a time
//! until it reaches the function the new thread actually starts in.
//!
//! A site is all-or-nothing: labels, properties and edges for one spawn call
//! are staged in a [`SiteBuffer`] and committed only when the whole chain
//! resolved.

use crate::domain::annotation::{labels, properties};
use crate::domain::context::{AnalysisContext, SiteBuffer};
use crate::domain::dataflow::{tag_thread_use, DataflowResolver};
use crate::domain::demangle::Demangler;
use crate::domain::program::{NodeKind, NodeRef, ProgramGraph};
use crate::domain::synthesized::{THREAD_ENTRY, THREAD_MOVE_VARIABLE, THREAD_SPAWN};
use crate::error::{ChainError, LookupFailure, TraceFailure};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_ENTRY_SYMBOL: &str = "std::rt::lang_start";
pub const DEFAULT_SPAWN_SYMBOL: &str = "std::thread::spawn";
pub const DEFAULT_INTRINSIC_PREFIX: &str = "llvm.";
pub const DEFAULT_VTABLE_MARKER: &str = "vtable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepMode {
    /// A call by demangled name inside the cursor function.
    Direct,
    /// A reference to a vtable record; slot 1 holds the next function.
    Vtable,
    /// A call to a compiler builtin whose operands carry the next function.
    BuiltinTrampoline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStep {
    #[serde(rename = "name")]
    pub expected_name: String,
    pub mode: StepMode,
}

impl ChainStep {
    pub fn direct(name: impl Into<String>) -> Self {
        Self {
            expected_name: name.into(),
            mode: StepMode::Direct,
        }
    }

    pub fn vtable(marker: impl Into<String>) -> Self {
        Self {
            expected_name: marker.into(),
            mode: StepMode::Vtable,
        }
    }

    pub fn trampoline(builtin: impl Into<String>) -> Self {
        Self {
            expected_name: builtin.into(),
            mode: StepMode::BuiltinTrampoline,
        }
    }
}

/// A validated, ordered chain of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    steps: Vec<ChainStep>,
}

impl ChainSpec {
    pub fn new(steps: Vec<ChainStep>) -> Result<Self, ChainError> {
        if steps.is_empty() {
            return Err(ChainError::Empty);
        }
        for (index, step) in steps.iter().enumerate() {
            if step.mode != StepMode::BuiltinTrampoline {
                continue;
            }
            // The trampoline's operand is matched against the next step's function name.
            match steps.get(index + 1) {
                None => {
                    return Err(ChainError::TrampolineWithoutTarget {
                        index,
                        name: step.expected_name.clone(),
                    })
                }
                Some(next) if next.mode != StepMode::Direct => {
                    return Err(ChainError::TrampolineTargetNotDirect {
                        index,
                        name: step.expected_name.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Self { steps })
    }

    /// Lowering of `std::thread::spawn` in the 1.7x standard library.
    pub fn rust_std_spawn() -> Self {
        Self {
            steps: vec![
                ChainStep::direct("std::thread::Builder::spawn"),
                ChainStep::direct("std::thread::Builder::spawn_unchecked"),
                ChainStep::vtable(DEFAULT_VTABLE_MARKER),
                ChainStep::direct("std::thread::Builder::spawn_unchecked::{{closure}}"),
                ChainStep::direct("std::panic::catch_unwind"),
                ChainStep::direct("std::panicking::try"),
                ChainStep::trampoline("__rust_try"),
                ChainStep::direct("std::panicking::try::do_call"),
                ChainStep::direct(
                    "<core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>::call_once",
                ),
                ChainStep::direct("std::thread::Builder::spawn_unchecked::{{closure}}::{{closure}}"),
                ChainStep::direct("std::sys_common::backtrace::__rust_begin_short_backtrace"),
            ],
        }
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self::rust_std_spawn()
    }
}

pub struct ChainTracer {
    spec: ChainSpec,
    intrinsic_prefixes: Vec<String>,
    demangle: Demangler,
}

impl ChainTracer {
    pub fn new(spec: ChainSpec, intrinsic_prefixes: Vec<String>, demangle: Demangler) -> Self {
        Self {
            spec,
            intrinsic_prefixes,
            demangle,
        }
    }

    fn fail(&self, step: usize, cause: LookupFailure) -> TraceFailure {
        let expected = self
            .spec
            .steps
            .get(step)
            .map(|s| s.expected_name.clone())
            .unwrap_or_else(|| "thread entry".to_string());
        TraceFailure {
            step,
            expected,
            cause,
        }
    }

    /// Follow the chain starting inside `spawn_fn` (the spawn call's callee)
    /// and return the function the new thread starts in.
    pub fn trace(&self, graph: &ProgramGraph, spawn_fn: &NodeRef) -> Result<NodeRef, TraceFailure> {
        let steps = self.spec.steps();
        let mut cursor = spawn_fn.clone();
        let mut index = 0;

        while index < steps.len() {
            let step = &steps[index];
            let cursor_name = (self.demangle)(&cursor.name);
            debug!(
                target: "threadtrace::chain",
                step = index,
                expected = %step.expected_name,
                cursor = %cursor_name,
                "following chain step"
            );
            match step.mode {
                StepMode::Direct => {
                    cursor = self
                        .direct(graph, &cursor, &step.expected_name)
                        .map_err(|cause| self.fail(index, cause))?;
                    index += 1;
                }
                StepMode::Vtable => {
                    cursor = self
                        .vtable(graph, &cursor, &step.expected_name)
                        .map_err(|cause| self.fail(index, cause))?;
                    index += 1;
                }
                StepMode::BuiltinTrampoline => {
                    // Validated chains never end on a trampoline.
                    let Some(next) = steps.get(index + 1) else {
                        return Err(self.fail(
                            index,
                            LookupFailure::MissingTrampolineTarget {
                                builtin: step.expected_name.clone(),
                                expected: String::new(),
                            },
                        ));
                    };
                    cursor = self
                        .trampoline(graph, &cursor, &step.expected_name, &next.expected_name)
                        .map_err(|cause| self.fail(index, cause))?;
                    index += 2;
                }
            }
        }

        self.entry_callee(graph, &cursor)
            .map_err(|cause| self.fail(steps.len(), cause))
    }

    fn find_call(&self, graph: &ProgramGraph, function: &NodeRef, name: &str) -> Option<NodeRef> {
        graph
            .calls(function)
            .into_iter()
            .find(|call| (self.demangle)(&call.name) == name)
    }

    fn direct(&self, graph: &ProgramGraph, cursor: &NodeRef, expected: &str) -> Result<NodeRef, LookupFailure> {
        let call = self
            .find_call(graph, cursor, expected)
            .ok_or_else(|| LookupFailure::MissingCall {
                function: (self.demangle)(&cursor.name),
                expected: expected.to_string(),
            })?;
        graph
            .callee(&call)
            .ok_or_else(|| LookupFailure::UnresolvedCallee {
                symbol: call.name.clone(),
            })
    }

    fn vtable(&self, graph: &ProgramGraph, cursor: &NodeRef, marker: &str) -> Result<NodeRef, LookupFailure> {
        let missing = || LookupFailure::MissingVtable {
            function: (self.demangle)(&cursor.name),
            marker: marker.to_string(),
        };
        let table = graph
            .blocks(cursor)
            .iter()
            .flat_map(|block| graph.references_within(block))
            .find(|r| r.name.contains(marker))
            .and_then(|r| graph.refers_to(&r).cloned())
            .ok_or_else(missing)?;

        // { data pointer, type descriptor, fn pointer, ... }
        let slots = graph.references_within(&table);
        if slots.len() < 2 {
            return Err(LookupFailure::ShortVtable {
                vtable: table.name.clone(),
                slots: slots.len(),
            });
        }
        graph
            .refers_to(&slots[1])
            .filter(|f| f.kind == NodeKind::FunctionDeclaration)
            .cloned()
            .ok_or_else(|| LookupFailure::UnresolvedCallee {
                symbol: slots[1].name.clone(),
            })
    }

    fn trampoline(
        &self,
        graph: &ProgramGraph,
        cursor: &NodeRef,
        builtin: &str,
        next: &str,
    ) -> Result<NodeRef, LookupFailure> {
        let call = self
            .find_call(graph, cursor, builtin)
            .ok_or_else(|| LookupFailure::MissingCall {
                function: (self.demangle)(&cursor.name),
                expected: builtin.to_string(),
            })?;
        // The target only shows up among the call's own operands.
        graph
            .references_within(&call)
            .into_iter()
            .find(|r| (self.demangle)(&r.name) == next)
            .and_then(|r| graph.refers_to(&r).cloned())
            .filter(|f| f.kind == NodeKind::FunctionDeclaration)
            .ok_or_else(|| LookupFailure::MissingTrampolineTarget {
                builtin: builtin.to_string(),
                expected: next.to_string(),
            })
    }

    fn is_intrinsic(&self, name: &str) -> bool {
        self.intrinsic_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    fn entry_callee(&self, graph: &ProgramGraph, cursor: &NodeRef) -> Result<NodeRef, LookupFailure> {
        let call = graph
            .calls(cursor)
            .into_iter()
            .find(|c| !self.is_intrinsic(&c.name))
            .ok_or_else(|| LookupFailure::MissingEntryCall {
                function: (self.demangle)(&cursor.name),
            })?;
        graph
            .callee(&call)
            .ok_or_else(|| LookupFailure::UnresolvedCallee {
                symbol: call.name.clone(),
            })
    }
}

/// Per-run totals of the thread analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadReport {
    pub spawn_sites: usize,
    pub resolved: usize,
    pub failed: usize,
    pub moved_values_resolved: usize,
}

/// Drives the tracer over every spawn site of a program.
pub struct ThreadAnalysis {
    pub tracer: ChainTracer,
    pub entry_symbol: String,
    pub spawn_symbol: String,
}

impl ThreadAnalysis {
    fn demangled(&self, node: &NodeRef) -> String {
        (self.tracer.demangle)(&node.name)
    }

    /// The program's main function: first argument of the runtime entry call.
    pub fn find_main(&self, graph: &ProgramGraph) -> Option<NodeRef> {
        let entry_call = graph
            .ast_nodes()
            .into_iter()
            .filter(|n| n.kind == NodeKind::CallExpression)
            .find(|c| self.demangled(c) == self.entry_symbol)?;
        let first = graph.arguments(&entry_call).into_iter().next()?;
        if first.kind == NodeKind::FunctionDeclaration {
            return Some(first);
        }
        graph
            .refers_to(&first)
            .filter(|f| f.kind == NodeKind::FunctionDeclaration)
            .cloned()
    }

    pub fn run(&self, graph: &ProgramGraph, ctx: &mut AnalysisContext) -> ThreadReport {
        let mut report = ThreadReport::default();
        let Some(main) = self.find_main(graph) else {
            info!(target: "threadtrace::chain", entry = %self.entry_symbol, "no runtime entry call, skipping thread analysis");
            return report;
        };
        ctx.annotations.add_label(&main, labels::MAIN_FUNCTION);

        let mut thread_context: u32 = 0;
        for call in graph.calls(&main) {
            if self.demangled(&call) != self.spawn_symbol {
                continue;
            }
            thread_context += 1;
            report.spawn_sites += 1;

            match self.trace_site(graph, ctx, &main, &call, thread_context) {
                Ok(buffer) => {
                    let moved_resolved = buffer
                        .edges()
                        .iter()
                        .any(|e| e.rel_type == THREAD_MOVE_VARIABLE);
                    buffer.commit(ctx);
                    report.resolved += 1;
                    if moved_resolved {
                        report.moved_values_resolved += 1;
                    }
                    info!(target: "threadtrace::chain", context = thread_context, "spawn site resolved");
                }
                Err(failure) => {
                    report.failed += 1;
                    warn!(
                        target: "threadtrace::chain",
                        context = thread_context,
                        site = ?call,
                        error = %failure,
                        "spawn site trace failed, nothing committed"
                    );
                }
            }
        }

        report
    }

    fn trace_site(
        &self,
        graph: &ProgramGraph,
        ctx: &mut AnalysisContext,
        main: &NodeRef,
        call: &NodeRef,
        thread_context: u32,
    ) -> Result<SiteBuffer, TraceFailure> {
        let spawn_fn = graph.callee(call).ok_or_else(|| TraceFailure {
            step: 0,
            expected: self.spawn_symbol.clone(),
            cause: LookupFailure::UnresolvedCallee {
                symbol: call.name.clone(),
            },
        })?;
        let entry = self.tracer.trace(graph, &spawn_fn)?;

        let mut buffer = SiteBuffer::new();
        buffer.add_label(&spawn_fn, labels::THREAD_SPAWN);
        buffer.connect(main, &spawn_fn, THREAD_SPAWN);

        buffer.add_label(&entry, labels::THREAD_START);
        buffer.set_property(&entry, properties::THREAD, format!("T{thread_context}"));
        buffer.set_property(&entry, properties::THREAD_CONTEXT, thread_context.to_string());
        buffer.connect(call, &entry, THREAD_ENTRY);

        if let Some(moved) = graph.arguments(call).last() {
            let resolution = DataflowResolver::new(graph).resolve(moved, ctx.annotations.identity_mut());
            tag_thread_use(&resolution, thread_context, &ctx.annotations, &mut buffer);
            match (&resolution.terminal, graph.parameters(&entry).first()) {
                (Some(terminal), Some(parameter)) => {
                    buffer.connect(terminal, parameter, THREAD_MOVE_VARIABLE);
                }
                (None, _) => {
                    debug!(target: "threadtrace::chain", context = thread_context, "moved value did not resolve");
                }
                (Some(_), None) => {
                    debug!(target: "threadtrace::chain", context = thread_context, "thread entry takes no parameter");
                }
            }
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chain_is_rejected() {
        assert_eq!(ChainSpec::new(vec![]), Err(ChainError::Empty));
    }

    #[test]
    fn test_trailing_trampoline_is_rejected() {
        let err = ChainSpec::new(vec![ChainStep::direct("a"), ChainStep::trampoline("__rust_try")]);
        assert_eq!(
            err,
            Err(ChainError::TrampolineWithoutTarget {
                index: 1,
                name: "__rust_try".to_string()
            })
        );
    }

    #[test]
    fn test_trampoline_must_lead_into_direct_step() {
        let err = ChainSpec::new(vec![
            ChainStep::trampoline("__rust_try"),
            ChainStep::vtable(DEFAULT_VTABLE_MARKER),
            ChainStep::direct("a"),
        ]);
        assert_eq!(
            err,
            Err(ChainError::TrampolineTargetNotDirect {
                index: 0,
                name: "__rust_try".to_string()
            })
        );

        let err = ChainSpec::new(vec![
            ChainStep::direct("a"),
            ChainStep::trampoline("__rust_try"),
            ChainStep::trampoline("__rust_try"),
            ChainStep::direct("b"),
        ]);
        assert!(matches!(err, Err(ChainError::TrampolineTargetNotDirect { index: 1, .. })));
    }

    #[test]
    fn test_std_chain_shape() {
        let spec = ChainSpec::rust_std_spawn();
        assert_eq!(spec.len(), 11);
        assert_eq!(spec.steps()[2].mode, StepMode::Vtable);
        assert_eq!(spec.steps()[6].mode, StepMode::BuiltinTrampoline);
        assert_eq!(ChainSpec::new(spec.steps().to_vec()), Ok(spec));
    }
}
