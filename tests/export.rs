mod common;

use common::std_spawn_program;
use std::collections::BTreeMap;
use tempfile::tempdir;
use threadtrace::application::AnalyzeUsecase;
use threadtrace::domain::annotation::labels;
use threadtrace::domain::context::AnalysisContext;
use threadtrace::domain::demangle::demangle;
use threadtrace::domain::program::NodeRef;
use threadtrace::domain::store::{GraphStore, MemoryGraphStore, SledGraphStore, StoreSnapshot};
use threadtrace::error::{ExportError, StoreError};
use threadtrace::infrastructure::config::AnalysisConfig;
use threadtrace::infrastructure::exporter::{ExportOptions, GraphExporter};
use threadtrace::infrastructure::passes::PassPipeline;
use threadtrace::ports::statement::{Identifier, NodeRow, PropertyValue, Statement, ID_KEY};

const STALE_ID: u64 = 424_242;

fn exporter() -> GraphExporter {
    GraphExporter::new(
        ExportOptions {
            workers: 2,
            ..ExportOptions::default()
        },
        demangle,
    )
}

fn seed_stale_node(store: &dyn GraphStore) {
    let mut properties = BTreeMap::new();
    properties.insert(ID_KEY.to_string(), PropertyValue::from(STALE_ID));
    store
        .execute(&Statement::CreateNodes {
            labels: vec![Identifier::new("Stale").unwrap()],
            rows: vec![NodeRow { properties }],
        })
        .unwrap();
}

fn rel_count(snapshot: &StoreSnapshot, rel_type: &str) -> usize {
    snapshot.relationships_of_type(rel_type).count()
}

/// Fails every relationship statement.
struct RejectingStore {
    inner: MemoryGraphStore,
}

impl GraphStore for RejectingStore {
    fn execute(&self, statement: &Statement) -> Result<(), StoreError> {
        if let Statement::MergeRelationships { .. } = statement {
            return Err(StoreError::Rejected("connection reset".to_string()));
        }
        self.inner.execute(statement)
    }

    fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        self.inner.snapshot()
    }
}

#[test]
fn test_full_analysis_reaches_the_store() {
    let program = std_spawn_program(&[2]);
    let site = &program.sites[0];
    let pipeline = PassPipeline::standard(&AnalysisConfig::default(), demangle).unwrap();
    let exporter = exporter();
    let store = MemoryGraphStore::new();

    let outcome = AnalyzeUsecase {
        pipeline: &pipeline,
        exporter: &exporter,
        store: &store,
    }
    .run(&program.graph, false)
    .unwrap();
    assert!(outcome.exported);

    let identity = outcome.context.annotations.identity();
    let id = |node: &NodeRef| identity.get(node).unwrap();
    let snapshot = store.snapshot().unwrap();
    assert!(snapshot.indexed);
    assert_eq!(snapshot.nodes.len(), outcome.summary.nodes);

    let entry = snapshot.node(id(&site.entry)).unwrap();
    assert!(entry.labels.iter().any(|l| l == labels::THREAD_START));
    assert!(entry.labels.iter().any(|l| l == "FunctionDeclaration"));
    assert_eq!(entry.properties["thread"], PropertyValue::from("T1"));
    assert_eq!(entry.properties["name"], PropertyValue::from("app::main::{{closure}}"));

    let data = snapshot.node(id(&program.data_decl)).unwrap();
    assert!(data.labels.iter().any(|l| l == labels::TRACKED_NODE));

    // The debug intrinsic and its operand never reach the store.
    assert!(snapshot.node(id(&program.debug_declare)).is_none());
    assert_eq!(snapshot.nodes_with_label("TranslationUnitDeclaration").count(), 0);

    let entry_edges: Vec<_> = snapshot.relationships_of_type("THREAD_ENTRY").collect();
    assert_eq!(entry_edges.len(), 1);
    assert_eq!((entry_edges[0].start_id, entry_edges[0].end_id), (id(&site.call), id(&site.entry)));
    assert_eq!(rel_count(&snapshot, "THREAD_SPAWN"), 1);
    assert_eq!(rel_count(&snapshot, "THREAD_MOVE_VARIABLE"), 1);
    assert_eq!(rel_count(&snapshot, "DROP_CALL"), 1);
    assert_eq!(rel_count(&snapshot, "EOG"), 0);
}

#[test]
fn test_dry_run_writes_nothing() {
    let program = std_spawn_program(&[2]);
    let pipeline = PassPipeline::standard(&AnalysisConfig::default(), demangle).unwrap();
    let exporter = exporter();
    let store = MemoryGraphStore::new();

    let outcome = AnalyzeUsecase {
        pipeline: &pipeline,
        exporter: &exporter,
        store: &store,
    }
    .run(&program.graph, true)
    .unwrap();

    assert!(!outcome.exported);
    assert!(outcome.summary.nodes > 0);
    assert!(store.history().is_empty());
}

#[test]
fn test_export_replaces_prior_store_content() {
    let program = std_spawn_program(&[2]);
    let store = MemoryGraphStore::new();
    seed_stale_node(&store);

    let mut ctx = AnalysisContext::new();
    exporter().export(&program.graph, &mut ctx, &store).unwrap();

    let snapshot = store.snapshot().unwrap();
    assert!(snapshot.node(STALE_ID).is_none());
    assert_eq!(snapshot.nodes_with_label("Stale").count(), 0);

    let history = store.history();
    assert_eq!(history[1].cypher, Statement::Wipe.cypher());
    assert!(history.iter().any(|s| s.cypher == Statement::CreateIndex.cypher()));
}

#[test]
fn test_unsafe_label_aborts_before_wipe() {
    let program = std_spawn_program(&[2]);
    let store = MemoryGraphStore::new();
    seed_stale_node(&store);

    let mut ctx = AnalysisContext::new();
    ctx.annotations.add_label(&program.main, "Main) DETACH DELETE (n");
    let err = exporter().export(&program.graph, &mut ctx, &store).unwrap_err();

    assert!(matches!(err, ExportError::UnsafeIdentifier(_)));
    assert!(store.snapshot().unwrap().node(STALE_ID).is_some());
    assert_eq!(store.history().len(), 1);
}

#[test]
fn test_store_failure_is_fatal_transport_error() {
    let program = std_spawn_program(&[2]);
    let store = RejectingStore {
        inner: MemoryGraphStore::new(),
    };

    let mut ctx = AnalysisContext::new();
    let err = exporter().export(&program.graph, &mut ctx, &store).unwrap_err();

    match err {
        ExportError::Transport { statement, source } => {
            assert!(statement.contains("MERGE"));
            assert!(matches!(source, StoreError::Rejected(_)));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    // Node batches landed before the first relationship batch failed.
    assert!(!store.snapshot().unwrap().nodes.is_empty());
}

#[test]
fn test_sled_export_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.sled");
    let program = std_spawn_program(&[2, 2]);

    let summary = {
        let store = SledGraphStore::open(&path).unwrap();
        let mut ctx = AnalysisContext::new();
        PassPipeline::standard(&AnalysisConfig::default(), demangle)
            .unwrap()
            .run(&program.graph, &mut ctx);
        exporter().export(&program.graph, &mut ctx, &store).unwrap()
    };

    let reopened = SledGraphStore::open(&path).unwrap();
    let snapshot = reopened.snapshot().unwrap();
    assert_eq!(snapshot.nodes.len(), summary.nodes);
    assert_eq!(snapshot.relationships.len(), summary.relationships);
    assert_eq!(rel_count(&snapshot, "THREAD_ENTRY"), 2);
    assert_eq!(snapshot.nodes_with_label(labels::THREAD_START).count(), 2);
}
