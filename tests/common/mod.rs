// Synthetic program graphs shaped like rustc's LLVM IR for `std::thread::spawn`.
#![allow(dead_code)]

use threadtrace::domain::program::{AccessKind, Node, NodeKind, NodeRef, ProgramGraph, Relation};

/// Legacy-mangle a demangled path: `a::b<c::d>` -> `_ZN1a8b$LT$c..d$GT$17h...E`.
pub fn mangle(path: &str, hash: u64) -> String {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let chars: Vec<char> = path.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if depth == 0 && c == ':' && chars.get(i + 1) == Some(&':') {
            segments.push(std::mem::take(&mut current));
            i += 2;
            continue;
        }
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push(c);
        i += 1;
    }
    segments.push(current);

    let mut out = String::from("_ZN");
    for segment in segments {
        let escaped = escape(&segment);
        out.push_str(&escaped.len().to_string());
        out.push_str(&escaped);
    }
    let hash = format!("h{hash:016x}");
    out.push_str(&hash.len().to_string());
    out.push_str(&hash);
    out.push('E');
    out
}

fn escape(segment: &str) -> String {
    let mut out = String::new();
    let mut rest = segment;
    while let Some(c) = rest.chars().next() {
        if rest.starts_with("::") {
            out.push_str("..");
            rest = &rest[2..];
            continue;
        }
        match c {
            '<' => out.push_str("$LT$"),
            '>' => out.push_str("$GT$"),
            '(' => out.push_str("$LP$"),
            ')' => out.push_str("$RP$"),
            ',' => out.push_str("$C$"),
            '&' => out.push_str("$RF$"),
            '*' => out.push_str("$BP$"),
            '@' => out.push_str("$SP$"),
            ' ' => out.push_str("$u20$"),
            '{' => out.push_str("$u7b$"),
            '}' => out.push_str("$u7d$"),
            other => out.push(other),
        }
        rest = &rest[c.len_utf8()..];
    }
    if out.starts_with('$') {
        out.insert(0, '_');
    }
    out
}

pub struct ProgramBuilder {
    pub graph: ProgramGraph,
    pub tu: NodeRef,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        let mut graph = ProgramGraph::new();
        let tu = graph.add_root(Node::new(NodeKind::TranslationUnitDeclaration, "main.ll"));
        Self { graph, tu }
    }

    /// A function with one body block.
    pub fn function(&mut self, name: &str) -> (NodeRef, NodeRef) {
        let tu = self.tu.clone();
        let f = self.graph.add_child(&tu, Relation::Declarations, Node::new(NodeKind::FunctionDeclaration, name));
        let block = self.graph.add_child(&f, Relation::Body, Node::new(NodeKind::Block, "start"));
        (f, block)
    }

    /// A call resolved by symbol name only.
    pub fn call(&mut self, block: &NodeRef, name: &str) -> NodeRef {
        self.graph
            .add_child(block, Relation::Statements, Node::new(NodeKind::CallExpression, name))
    }

    /// A call carrying an INVOKES edge to `callee`.
    pub fn call_invoking(&mut self, block: &NodeRef, callee: &NodeRef) -> NodeRef {
        let call = self.call(block, &callee.name);
        self.graph.connect(&call, callee, Relation::Invokes);
        call
    }

    /// A reference to `target`, named after it.
    pub fn reference(&mut self, parent: &NodeRef, relation: Relation, target: &NodeRef) -> NodeRef {
        let r = self
            .graph
            .add_child(parent, relation, Node::new(NodeKind::Reference, target.name.clone()));
        self.graph.connect(&r, target, Relation::RefersTo);
        r
    }

    pub fn dfg(&mut self, from: &NodeRef, to: &NodeRef) {
        self.graph.connect(from, to, Relation::Dfg);
    }
}

pub struct SpawnSite {
    pub call: NodeRef,
    pub spawn_fn: NodeRef,
    pub entry: NodeRef,
    pub entry_param: NodeRef,
    pub moved: NodeRef,
    pub vtable: NodeRef,
}

pub struct SpawnProgram {
    pub graph: ProgramGraph,
    pub main: NodeRef,
    pub lang_start_call: NodeRef,
    pub data_decl: NodeRef,
    pub data_write: NodeRef,
    pub literal: NodeRef,
    pub debug_declare: NodeRef,
    pub drop_call: NodeRef,
    pub sites: Vec<SpawnSite>,
}

/// The monomorphized spawn chain for one site. `vtable_slots` is the number
/// of references in the closure vtable (2 or more for a well-formed one).
fn spawn_chain(b: &mut ProgramBuilder, site: usize, vtable_slots: usize) -> (NodeRef, NodeRef, NodeRef, NodeRef) {
    let h = |i: u64| ((site as u64 + 1) << 8) | i;

    let (spawn_fn, b0) = b.function(&mangle("std::thread::spawn", h(0)));
    let (builder_spawn, b1) = b.function(&mangle("std::thread::Builder::spawn", h(1)));
    b.call_invoking(&b0, &builder_spawn);

    let (unchecked, b2) = b.function(&mangle("std::thread::Builder::spawn_unchecked", h(2)));
    b.call(&b1, &unchecked.name);

    let (shim, b3) = b.function(&mangle("core::ops::function::FnOnce::call_once", h(3)));
    let (drop_fn, _) = b.function(&mangle("core::ptr::drop_in_place<app::main::{{closure}}>", h(4)));
    let tu = b.tu.clone();
    let vtable = b.graph.add_child(
        &tu,
        Relation::Declarations,
        Node::new(NodeKind::VariableDeclaration, format!("vtable.{site}")),
    );
    let init = b.graph.add_child(
        &vtable,
        Relation::Initializer,
        Node::new(NodeKind::InitializerListExpression, "{ ptr, [16 x i8], ptr, [0 x i8] }"),
    );
    for slot in [&drop_fn, &shim].into_iter().take(vtable_slots) {
        b.reference(&init, Relation::Arguments, slot);
    }
    let vtable_ref = b.graph.add_child(
        &b2,
        Relation::Statements,
        Node::new(NodeKind::Reference, format!("vtable.{site}")),
    );
    b.graph.connect(&vtable_ref, &vtable, Relation::RefersTo);

    let (closure, b4) = b.function(&mangle("std::thread::Builder::spawn_unchecked::{{closure}}", h(5)));
    b.call_invoking(&b3, &closure);
    let (catch_unwind, b5) = b.function(&mangle("std::panic::catch_unwind", h(6)));
    b.call(&b4, &catch_unwind.name);
    let (try_fn, b6) = b.function(&mangle("std::panicking::try", h(7)));
    b.call_invoking(&b5, &try_fn);

    let (do_call, b7) = b.function(&mangle("std::panicking::try::do_call", h(8)));
    let rust_try = b.call(&b6, "__rust_try");
    b.reference(&rust_try, Relation::Arguments, &do_call);

    let (call_once, b8) = b.function(&mangle(
        "<core::panic::unwind_safe::AssertUnwindSafe<F> as core::ops::function::FnOnce<()>>::call_once",
        h(9),
    ));
    b.call_invoking(&b7, &call_once);
    let (inner, b9) = b.function(&mangle("std::thread::Builder::spawn_unchecked::{{closure}}::{{closure}}", h(10)));
    b.call(&b8, &inner.name);
    let (backtrace, b10) = b.function(&mangle("std::sys_common::backtrace::__rust_begin_short_backtrace", h(11)));
    b.call_invoking(&b9, &backtrace);

    b.call(&b10, "llvm.dbg.declare");
    let (entry, _) = b.function(&mangle("app::main::{{closure}}", h(12)));
    let param = b
        .graph
        .add_child(&entry, Relation::Parameters, Node::new(NodeKind::ParameterDeclaration, "_1"));
    b.call_invoking(&b10, &entry);

    (spawn_fn, entry, param, vtable)
}

/// `app::main` with one spawn site per entry of `vtable_slots`, every site
/// moving the same variable `data = 42` into its thread.
pub fn std_spawn_program(vtable_slots: &[usize]) -> SpawnProgram {
    let mut b = ProgramBuilder::new();

    let (main, mb) = b.function(&mangle("app::main", 0xa));
    let data_decl = b
        .graph
        .add_child(&mb, Relation::Statements, Node::new(NodeKind::VariableDeclaration, "data"));
    let literal = b.graph.add_child(&mb, Relation::Statements, Node::new(NodeKind::Literal, "42"));
    let data_write = b.graph.add_child(
        &mb,
        Relation::Statements,
        Node::new(NodeKind::Reference, "data").with_access(AccessKind::Write),
    );
    b.graph.connect(&data_write, &data_decl, Relation::RefersTo);
    b.dfg(&literal, &data_write);
    b.dfg(&data_write, &data_decl);

    let debug_declare = b.call(&mb, "llvm.dbg.declare");
    b.graph.add_child(
        &debug_declare,
        Relation::Arguments,
        Node::new(NodeKind::Reference, "data").with_code("ptr %data"),
    );

    let mut sites = Vec::new();
    for (index, slots) in vtable_slots.iter().enumerate() {
        let (spawn_fn, entry, entry_param, vtable) = spawn_chain(&mut b, index, *slots);
        let call = b.call_invoking(&mb, &spawn_fn);
        let moved = b.graph.add_child(
            &call,
            Relation::Arguments,
            Node::new(NodeKind::Reference, "data").with_access(AccessKind::Read),
        );
        b.graph.connect(&moved, &data_decl, Relation::RefersTo);
        b.dfg(&data_decl, &moved);
        sites.push(SpawnSite {
            call,
            spawn_fn,
            entry,
            entry_param,
            moved,
            vtable,
        });
    }

    let drop_call = b.call(&mb, &mangle("core::ptr::drop_in_place<alloc::vec::Vec<u8>>", 0xd));
    b.reference(&drop_call, Relation::Arguments, &data_decl);

    let (_, cb) = b.function("main");
    let lang_start_call = b.call(&cb, &mangle("std::rt::lang_start", 0xb));
    b.reference(&lang_start_call, Relation::Arguments, &main);

    SpawnProgram {
        graph: b.graph,
        main,
        lang_start_call,
        data_decl,
        data_write,
        literal,
        debug_declare,
        drop_call,
        sites,
    }
}
