//! 写入 SQLite（动态建表）
//!
//! 首次写入某表时按记录的键建表（每个键一列 TEXT），之后遇到新键用 ALTER TABLE 补列。
//! 表名与列名必须是合法标识符，SQL 中一律加双引号。

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

use crate::units::{
    str_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec, Params, ResolvedConfig,
    UnitSchema, UnitSpec,
};

/// 自增主键列，记录中不可使用
const ROW_ID: &str = "row_id";

const CONFIG: &[ConfigRequirement] = &[ConfigRequirement::required("db_url", "DB_URL")];

static IDENTIFIER_RE: OnceLock<Regex> = OnceLock::new();

fn is_identifier(s: &str) -> bool {
    let re = IDENTIFIER_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
    re.is_match(s)
}

/// data_type → 默认表名
pub fn default_table(data_type: &str) -> String {
    match data_type {
        "email" => "emails".to_string(),
        "transcript" => "transcripts".to_string(),
        "event" => "calendar_events".to_string(),
        other => other.to_string(),
    }
}

/// sqlite:///path、sqlite://path 或直接的文件路径
fn sqlite_path(db_url: &str) -> PathBuf {
    let path = db_url
        .strip_prefix("sqlite:///")
        .or_else(|| db_url.strip_prefix("sqlite://"))
        .unwrap_or(db_url);
    PathBuf::from(path)
}

/// data 可以是单条记录或记录数组
fn records(data: &Value) -> Vec<&Map<String, Value>> {
    match data {
        Value::Object(map) => vec![map],
        Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

fn cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

/// 建表 / 补列后逐条插入，整个写入在一个事务中完成
fn write_records(
    path: PathBuf,
    table: &str,
    rows: Vec<Map<String, Value>>,
) -> anyhow::Result<usize> {
    let mut conn = Connection::open(&path)?;
    let tx = conn.transaction()?;

    // SQLite 列名不区分大小写：按小写去重，保留首次出现的写法
    let mut columns: BTreeMap<String, &String> = BTreeMap::new();
    for key in rows.iter().flat_map(|r| r.keys()) {
        columns.entry(key.to_ascii_lowercase()).or_insert(key);
    }
    let existing: BTreeSet<String> = {
        let mut stmt = tx.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names
            .map(|name| name.map(|n| n.to_ascii_lowercase()))
            .collect::<Result<_, _>>()?
    };

    if existing.is_empty() {
        let mut defs = vec![
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote(ROW_ID)),
            "\"created_at\" TEXT DEFAULT CURRENT_TIMESTAMP".to_string(),
        ];
        defs.extend(
            columns
                .iter()
                .filter(|(lower, _)| lower.as_str() != "created_at")
                .map(|(_, c)| format!("{} TEXT", quote(c))),
        );
        tx.execute(
            &format!("CREATE TABLE {} ({})", quote(table), defs.join(", ")),
            [],
        )?;
        tracing::info!(table = %table, columns = ?columns.values(), "created table");
    } else {
        let missing = columns
            .iter()
            .filter(|(lower, _)| !existing.contains(lower.as_str()))
            .map(|(_, c)| c);
        for column in missing {
            tx.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} TEXT", quote(table), quote(column)),
                [],
            )?;
            tracing::info!(table = %table, column = %column, "added column");
        }
    }

    for row in &rows {
        let names: Vec<String> = row.keys().map(|k| quote(k)).collect();
        let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
        let values: Vec<Option<String>> = row.values().map(cell).collect();
        tx.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(table),
                names.join(", "),
                placeholders.join(", ")
            ),
            rusqlite::params_from_iter(values.iter()),
        )?;
    }
    tx.commit()?;
    Ok(rows.len())
}

pub struct DbWriterUnit;

impl UnitSpec for DbWriterUnit {
    const TYPE_NAME: &'static str = "DbWriterUnit";
    const DESCRIPTION: &'static str =
        "Insert one record or a list of records into a SQLite table, creating the table and columns as needed.";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .required(ParameterSpec::new(
                "data",
                ParamType::Dict,
                "Record or list of records to insert",
            ))
            .optional(
                ParameterSpec::new(
                    "data_type",
                    ParamType::String,
                    "Kind of data ('email', 'transcript', 'event', ...); selects the default table",
                )
                .with_default("generic"),
            )
            .optional(ParameterSpec::new(
                "table_name",
                ParamType::String,
                "Target table; derived from data_type when omitted",
            ))
            .build()
    }

    fn config_requirements() -> &'static [ConfigRequirement] {
        CONFIG
    }

    fn build(_config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

impl DbWriterUnit {
    fn table_for(params: &Params) -> String {
        match params.get("table_name").and_then(Value::as_str) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => default_table(
                params
                    .get("data_type")
                    .and_then(Value::as_str)
                    .unwrap_or("generic"),
            ),
        }
    }
}

#[async_trait]
impl ActionUnit for DbWriterUnit {
    fn check(&self, params: &Params) -> Result<(), String> {
        let table = Self::table_for(params);
        if !is_identifier(&table) {
            return Err(format!("table name '{table}' is not a valid identifier"));
        }
        if let Some(data) = params.get("data") {
            let mut seen: BTreeMap<String, &str> = BTreeMap::new();
            for record in records(data) {
                for key in record.keys() {
                    if !is_identifier(key) {
                        return Err(format!("column name '{key}' is not a valid identifier"));
                    }
                    if key.eq_ignore_ascii_case(ROW_ID) {
                        return Err(format!("column name '{ROW_ID}' is reserved"));
                    }
                    let first = *seen.entry(key.to_ascii_lowercase()).or_insert(key.as_str());
                    if first != key.as_str() {
                        return Err(format!(
                            "column names '{first}' and '{key}' differ only in case"
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        let data = params
            .get("data")
            .ok_or_else(|| anyhow::anyhow!("parameter 'data' is missing"))?;
        let data_type = str_param(params, "data_type").unwrap_or("generic");
        let table = Self::table_for(params);
        let db_url = config
            .get_string("db_url")
            .ok_or_else(|| anyhow::anyhow!("db_url not configured"))?;

        let rows: Vec<Map<String, Value>> = records(data).into_iter().cloned().collect();
        if rows.is_empty() {
            return Ok(json!({ "status": "success", "count": 0, "table": table }));
        }

        let path = sqlite_path(&db_url);
        let target = table.clone();
        let count =
            tokio::task::spawn_blocking(move || write_records(path, &target, rows)).await??;
        tracing::info!(table = %table, data_type = %data_type, count, "rows written");
        Ok(json!({ "status": "success", "count": count, "table": table }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_default_tables() {
        assert_eq!(default_table("email"), "emails");
        assert_eq!(default_table("transcript"), "transcripts");
        assert_eq!(default_table("event"), "calendar_events");
        assert_eq!(default_table("notes"), "notes");
    }

    #[test]
    fn test_sqlite_path_forms() {
        assert_eq!(sqlite_path("sqlite:///data/app.db"), PathBuf::from("data/app.db"));
        assert_eq!(sqlite_path("sqlite:////tmp/app.db"), PathBuf::from("/tmp/app.db"));
        assert_eq!(sqlite_path("sqlite://app.db"), PathBuf::from("app.db"));
        assert_eq!(sqlite_path("/var/app.db"), PathBuf::from("/var/app.db"));
    }

    #[test]
    fn test_check_rejects_bad_identifiers() {
        let unit = DbWriterUnit;
        let err = unit
            .check(&params(json!({"data": {"k": "v"}, "table_name": "x; DROP TABLE y"})))
            .unwrap_err();
        assert!(err.contains("not a valid identifier"));
        let err = unit
            .check(&params(json!({"data": {"bad key": "v"}})))
            .unwrap_err();
        assert!(err.contains("bad key"));
        assert!(unit
            .check(&params(json!({"data": [{"from": "a", "subject": "b"}], "data_type": "email"})))
            .is_ok());
    }

    #[test]
    fn test_check_reserved_and_case_variant_columns() {
        let unit = DbWriterUnit;
        let err = unit.check(&params(json!({"data": {"ROW_ID": 1}}))).unwrap_err();
        assert!(err.contains("reserved"));
        let err = unit
            .check(&params(json!({"data": [{"Subject": "a"}, {"subject": "b"}]})))
            .unwrap_err();
        assert_eq!(err, "column names 'Subject' and 'subject' differ only in case");
    }

    #[tokio::test]
    async fn test_later_key_matches_existing_column_ignoring_case() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("case.db");
        let config = ResolvedConfig::default().with("db_url", db.display().to_string());
        let unit = DbWriterUnit;

        for data in [json!({"Subject": "a"}), json!({"subject": "b"})] {
            let call = params(json!({"data": data, "table_name": "t"}));
            unit.check(&call).unwrap();
            let out = unit.execute(&call, &config).await.unwrap();
            assert_eq!(out["count"], json!(1));
        }

        let conn = Connection::open(&db).unwrap();
        let subjects: Vec<String> = conn
            .prepare("SELECT subject FROM t ORDER BY row_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(subjects, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_write_creates_table_then_adds_columns() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("out.db");
        let config = ResolvedConfig::default().with("db_url", format!("sqlite:///{}", db.display()));
        let unit = DbWriterUnit;

        let out = unit
            .execute(
                &params(json!({
                    "data": [
                        {"from": "a@x", "subject": "one", "body": "b1"},
                        {"from": "b@x", "subject": "two", "body": "b2"}
                    ],
                    "data_type": "email"
                })),
                &config,
            )
            .await
            .unwrap();
        assert_eq!(out, json!({"status": "success", "count": 2, "table": "emails"}));

        let out = unit
            .execute(
                &params(json!({
                    "data": {"from": "c@x", "subject": "three", "labels": ["x", "y"]},
                    "data_type": "email"
                })),
                &config,
            )
            .await
            .unwrap();
        assert_eq!(out["count"], json!(1));

        let conn = Connection::open(&db).unwrap();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM emails", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 3);
        let labels: String = conn
            .query_row("SELECT labels FROM emails WHERE subject = 'three'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(labels, r#"["x","y"]"#);
    }

    #[tokio::test]
    async fn test_empty_list_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ResolvedConfig::default()
            .with("db_url", dir.path().join("e.db").display().to_string());
        let out = DbWriterUnit
            .execute(&params(json!({"data": [], "table_name": "things"})), &config)
            .await
            .unwrap();
        assert_eq!(out["count"], json!(0));
        assert_eq!(out["table"], json!("things"));
    }
}
