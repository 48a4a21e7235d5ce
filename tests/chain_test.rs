//! 链式执行：data 参数传递、失败即停、命名链写库

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use orchestron::chain::{Chain, ChainEngine, ChainStep, NamedChain};
use orchestron::core::OrchestronError;
use orchestron::units::{
    ActionUnit, ConfigResolver, DbWriterUnit, EmailGetterUnit, Invoker, ParamType, ParameterSpec,
    Params, Registry, ResolvedConfig, UnitCatalog, UnitDefinition, UnitSchema, UnitSpec,
};

/// 返回固定结果
struct FixedUnit(Value);

#[async_trait]
impl ActionUnit for FixedUnit {
    async fn execute(&self, _params: &Params, _config: &ResolvedConfig) -> anyhow::Result<Value> {
        Ok(self.0.clone())
    }
}

/// 返回收到的 data，并计数
struct RecordingUnit {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl ActionUnit for RecordingUnit {
    async fn execute(&self, params: &Params, _config: &ResolvedConfig) -> anyhow::Result<Value> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "received": params.get("data").cloned().unwrap_or(Value::Null) }))
    }
}

struct FailingUnit;

#[async_trait]
impl ActionUnit for FailingUnit {
    async fn execute(&self, _params: &Params, _config: &ResolvedConfig) -> anyhow::Result<Value> {
        anyhow::bail!("upstream service unavailable")
    }
}

fn data_schema() -> UnitSchema {
    UnitSchema::builder()
        .optional(ParameterSpec::new("data", ParamType::Dict, "Chained data"))
        .build()
}

fn fixed(type_name: &str, result: Value) -> UnitDefinition {
    UnitDefinition::new(type_name, "fixed result", UnitSchema::default(), move |_| {
        let unit: Arc<dyn ActionUnit> = Arc::new(FixedUnit(result.clone()));
        Ok(unit)
    })
}

fn recording(type_name: &str, hits: Arc<AtomicUsize>) -> UnitDefinition {
    UnitDefinition::new(type_name, "records data", data_schema(), move |_| {
        let unit: Arc<dyn ActionUnit> = Arc::new(RecordingUnit { hits: hits.clone() });
        Ok(unit)
    })
}

fn engine(catalog: UnitCatalog, sections: HashMap<String, Value>) -> ChainEngine {
    let mut registry = Registry::new(catalog, Arc::new(ConfigResolver::new(sections)));
    registry.register_catalog();
    ChainEngine::new(Invoker::new(Arc::new(registry)))
}

#[tokio::test]
async fn test_previous_result_becomes_data() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut catalog = UnitCatalog::new();
    catalog.add(fixed("SourceUnit", json!({"k": "v"})));
    catalog.add(recording("SinkUnit", hits.clone()));
    let engine = engine(catalog, HashMap::new());

    let chain = Chain::from_names(&["source", "sink"], &HashMap::new());
    let output = engine.run(&chain).await.unwrap();

    assert_eq!(output.steps.len(), 2);
    assert_eq!(output.steps[0].result, json!({"k": "v"}));
    assert_eq!(output.final_result(), Some(&json!({"received": {"k": "v"}})));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_explicit_data_is_not_overwritten() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut catalog = UnitCatalog::new();
    catalog.add(fixed("SourceUnit", json!({"k": "v"})));
    catalog.add(recording("SinkUnit", hits));
    let engine = engine(catalog, HashMap::new());

    let chain = Chain::new("explicit")
        .step(ChainStep::new("source"))
        .step(ChainStep::new("sink").param("data", json!({"mine": true})));
    let output = engine.run(&chain).await.unwrap();
    assert_eq!(
        output.into_final_result(),
        Some(json!({"received": {"mine": true}}))
    );
}

#[tokio::test]
async fn test_unit_without_data_parameter_gets_nothing_injected() {
    let mut catalog = UnitCatalog::new();
    catalog.add(fixed("SourceUnit", json!({"k": "v"})));
    catalog.add(fixed("PlainUnit", json!({"plain": true})));
    let engine = engine(catalog, HashMap::new());

    let chain = Chain::from_names(&["source", "plain"], &HashMap::new());
    let output = engine.run(&chain).await.unwrap();
    assert_eq!(output.final_result(), Some(&json!({"plain": true})));
}

#[tokio::test]
async fn test_failure_stops_the_chain() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut catalog = UnitCatalog::new();
    catalog.add(fixed("SourceUnit", json!({"k": "v"})));
    catalog.add(UnitDefinition::new(
        "FailingUnit",
        "always fails",
        data_schema(),
        |_| {
            let unit: Arc<dyn ActionUnit> = Arc::new(FailingUnit);
            Ok(unit)
        },
    ));
    catalog.add(recording("SinkUnit", hits.clone()));
    let engine = engine(catalog, HashMap::new());

    let chain = Chain::from_names(&["source", "failing", "sink"], &HashMap::new());
    let err = engine.run(&chain).await.unwrap_err();

    match err {
        OrchestronError::UnitExecution { unit, message, .. } => {
            assert_eq!(unit, "failing");
            assert!(message.contains("upstream service unavailable"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_unit_in_chain() {
    let engine = engine(UnitCatalog::new(), HashMap::new());
    let chain = Chain::from_names(&["ghost"], &HashMap::new());
    let err = engine.run(&chain).await.unwrap_err();
    assert!(matches!(err, OrchestronError::UnitNotFound(name) if name == "ghost"));
}

#[tokio::test]
async fn test_email_chain_writes_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chain.db");

    // 源单元沿用 emailgetter 的名字与 schema，但不连接邮箱
    let mut catalog = UnitCatalog::new();
    catalog.add(UnitDefinition::new(
        EmailGetterUnit::TYPE_NAME,
        "canned inbox",
        EmailGetterUnit::schema(),
        |_| {
            let unit: Arc<dyn ActionUnit> = Arc::new(FixedUnit(json!([
                {"from": "a@example.com", "subject": "hi", "body": "one"},
                {"from": "b@example.com", "subject": "yo", "body": "two"},
            ])));
            Ok(unit)
        },
    ));
    catalog.add(UnitDefinition::of::<DbWriterUnit>());
    let sections: HashMap<String, Value> = [(
        "dbwriter".to_string(),
        json!({ "db_url": format!("sqlite:///{}", db.display()) }),
    )]
    .into_iter()
    .collect();
    let engine = engine(catalog, sections);

    let mut args = Params::new();
    args.insert("max_emails".to_string(), json!(2));
    args.insert("irrelevant".to_string(), json!("dropped"));
    let output = engine
        .run_named(NamedChain::EmailToDb, &args)
        .await
        .unwrap();

    assert_eq!(output.chain_id, "emailgetter_to_db");
    let result = output.into_final_result().unwrap();
    assert_eq!(result["count"], 2);
    assert_eq!(result["table"], "emails");

    let conn = rusqlite::Connection::open(&db).unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn test_unknown_chain_id() {
    let err = "calendar_to_slack".parse::<NamedChain>().unwrap_err();
    assert!(matches!(err, OrchestronError::UnknownChain(id) if id == "calendar_to_slack"));
}
