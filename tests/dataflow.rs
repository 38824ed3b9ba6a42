mod common;

use common::std_spawn_program;
use threadtrace::domain::annotation::properties;
use threadtrace::domain::context::{AnalysisContext, SiteBuffer};
use threadtrace::domain::dataflow::{tag_thread_use, DataflowResolver};
use threadtrace::domain::identity::IdentityIndex;
use threadtrace::infrastructure::graph_loader::from_json_str;

const STORE_THEN_LOAD: &str = r#"{
  "nodes": [
    { "key": "tu", "kind": "TranslationUnitDeclaration", "name": "store.ll" },
    { "key": "p", "kind": "VariableDeclaration", "name": "p", "code": "%p = alloca i32, align 4" },
    { "key": "alloca", "kind": "NewArrayExpression", "name": "alloca", "code": "alloca i32, align 4" },
    { "key": "store", "kind": "AssignExpression", "name": "=", "code": "store i32 7, ptr %p, align 4" },
    { "key": "seven", "kind": "Literal", "name": "7" },
    { "key": "p_write", "kind": "Reference", "name": "p", "access": "WRITE" },
    { "key": "p_read", "kind": "Reference", "name": "p", "access": "READ", "code": "load i32, ptr %p" }
  ],
  "edges": [
    { "start": "tu", "end": "p", "relation": "DECLARATIONS" },
    { "start": "p", "end": "alloca", "relation": "INITIALIZER" },
    { "start": "alloca", "end": "p", "relation": "DFG" },
    { "start": "seven", "end": "store", "relation": "DFG" },
    { "start": "store", "end": "p_write", "relation": "DFG" },
    { "start": "p_write", "end": "p", "relation": "REFERS_TO" },
    { "start": "p_read", "end": "p", "relation": "REFERS_TO" },
    { "start": "p", "end": "p_read", "relation": "DFG" }
  ],
  "roots": ["tu"]
}"#;

#[test]
fn test_moved_value_walks_back_to_its_literal() {
    let program = std_spawn_program(&[2]);
    let mut identity = IdentityIndex::default();

    let resolution = DataflowResolver::new(&program.graph).resolve(&program.sites[0].moved, &mut identity);

    assert_eq!(resolution.terminal.as_ref(), Some(&program.literal));
    assert_eq!(
        resolution.visited,
        vec![
            program.sites[0].moved.clone(),
            program.data_decl.clone(),
            program.data_write.clone(),
            program.literal.clone(),
        ]
    );
    assert_eq!(resolution.ambiguous, 0);
}

#[test]
fn test_store_is_followed_to_stored_operand() {
    let loaded = from_json_str(STORE_THEN_LOAD).unwrap();
    let node = |key: &str| loaded.node(key).cloned().unwrap();
    let mut identity = IdentityIndex::default();

    let resolution = DataflowResolver::new(&loaded.graph).resolve(&node("p_read"), &mut identity);

    assert!(resolution.is_resolved());
    assert_eq!(resolution.terminal, Some(node("seven")));
    assert_eq!(
        resolution.visited,
        ["p_read", "p", "p_write", "store", "seven"].map(node).to_vec()
    );
}

#[test]
fn test_allocation_only_binding_does_not_resolve() {
    let json = STORE_THEN_LOAD.replace(r#"{ "start": "p_write", "end": "p", "relation": "REFERS_TO" },"#, "");
    let loaded = from_json_str(&json).unwrap();
    let node = |key: &str| loaded.node(key).cloned().unwrap();
    let mut identity = IdentityIndex::default();

    let resolution = DataflowResolver::new(&loaded.graph).resolve(&node("p_read"), &mut identity);

    assert!(!resolution.is_resolved());
    assert_eq!(resolution.visited, vec![node("p_read"), node("p")]);
}

#[test]
fn test_tagging_is_staged_until_commit() {
    let loaded = from_json_str(STORE_THEN_LOAD).unwrap();
    let node = |key: &str| loaded.node(key).cloned().unwrap();
    let mut ctx = AnalysisContext::new();

    let resolution = DataflowResolver::new(&loaded.graph).resolve(&node("p_read"), ctx.annotations.identity_mut());
    let mut buffer = SiteBuffer::new();
    tag_thread_use(&resolution, 4, &ctx.annotations, &mut buffer);

    assert_eq!(ctx.annotations.property(&node("seven"), properties::THREAD_USE), None);
    assert_eq!(buffer.pending_property(&node("seven"), properties::THREAD_USE), Some("T4"));

    buffer.commit(&mut ctx);
    for key in ["p_read", "p", "p_write", "store", "seven"] {
        assert_eq!(ctx.annotations.property(&node(key), properties::THREAD_USE), Some("T4"), "{key}");
    }
    assert_eq!(ctx.annotations.property(&node("alloca"), properties::THREAD_USE), None);
}
