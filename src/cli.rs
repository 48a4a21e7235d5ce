//! 命令行：list / run / chain / agent
//!
//! `run` 与 `chain` 之后的 `--param value` 按目标单元声明的类型转换
//! （integer、boolean、dict 按 JSON 解析）；无法转换时保留原字符串，由校验阶段报告类型错误。

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use crate::chain::NamedChain;
use crate::controller::ControllerEvent;
use crate::core::{Framework, FrameworkBuilder, OrchestronError};
use crate::units::{ParamType, Params, UnitSchema};

#[derive(Debug, Parser)]
#[command(name = "orchestron", about = "Plugin-style action unit orchestration")]
pub struct Cli {
    /// 配置文件（YAML / TOML）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// 单元清单目录，覆盖 app.units_dir
    #[arg(long, global = true)]
    pub units_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered units with their parameter schemas
    List,
    /// Invoke a single unit: run <unit> [--param value]...
    Run {
        unit: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a named chain: chain <chain-id> [--param value]...
    Chain {
        chain_id: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Let the decision maker drive units until it answers
    Agent {
        #[arg(long)]
        query: String,
    },
}

/// 把一个命令行取值按声明类型转换
fn convert(kind: Option<ParamType>, raw: &str) -> Value {
    match kind {
        Some(ParamType::Integer) => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(ParamType::Boolean) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Value::Bool(true),
            "false" | "0" | "no" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        Some(ParamType::Dict) => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        Some(ParamType::String) | None => Value::String(raw.to_string()),
    }
}

/// 解析 `--name value` / `--name=value` 序列；布尔参数后无取值时视为 true
pub fn parse_unit_args(
    unit: &str,
    schema: Option<&UnitSchema>,
    raw: &[String],
) -> Result<Params, OrchestronError> {
    let invalid = |message: String| OrchestronError::InvalidParameter {
        unit: unit.to_string(),
        message,
    };
    let kind_of = |name: &str| schema.and_then(|s| s.parameter(name)).map(|p| p.kind);

    let mut params = Params::new();
    let mut tokens = raw.iter().peekable();
    while let Some(token) = tokens.next() {
        let Some(flag) = token.strip_prefix("--").filter(|f| !f.is_empty()) else {
            return Err(invalid(format!("expected --<param>, got '{token}'")));
        };
        let (name, value) = match flag.split_once('=') {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => {
                let name = flag.to_string();
                let next_is_value = tokens.peek().is_some_and(|t| !t.starts_with("--"));
                if next_is_value {
                    let value = tokens.next().cloned().unwrap_or_default();
                    (name, value)
                } else if kind_of(&name) == Some(ParamType::Boolean) {
                    (name, "true".to_string())
                } else {
                    return Err(invalid(format!("missing value for --{flag}")));
                }
            }
        };
        let kind = kind_of(&name);
        params.insert(name, convert(kind, &value));
    }
    Ok(params)
}

/// 执行子命令，返回要打印的 JSON
pub async fn execute(
    command: Command,
    builder: &FrameworkBuilder,
    framework: &Framework,
) -> anyhow::Result<Value> {
    let registry = framework.invoker.registry();
    match command {
        Command::List => Ok(serde_json::to_value(registry.list())?),
        Command::Run { unit, args } => {
            let schema = registry.get(&unit)?.schema().clone();
            let params = parse_unit_args(&unit, Some(&schema), &args)?;
            Ok(framework.invoker.run(&unit, params).await?)
        }
        Command::Chain { chain_id, args } => {
            let chain: NamedChain = chain_id.parse()?;
            let schema = registry
                .get(chain.source_unit())
                .ok()
                .map(|u| u.schema().clone());
            let params = parse_unit_args(chain.source_unit(), schema.as_ref(), &args)?;
            let output = framework.chains.run_named(chain, &params).await?;
            Ok(json!({
                "chain_id": output.chain_id.clone(),
                "result": output.into_final_result(),
            }))
        }
        Command::Agent { query } => {
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ControllerEvent>();
            let progress = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    match &ev {
                        ControllerEvent::Observation { unit, ok, preview, .. } => {
                            tracing::info!(unit = %unit, ok, preview = %preview, "observation");
                        }
                        other => tracing::debug!(event = ?other, "controller event"),
                    }
                }
            });
            let controller = framework
                .llm_controller(builder.build_llm())
                .with_event_tx(tx);
            let run = controller.run(&query).await;
            drop(controller);
            let _ = progress.await;
            let run = run?;
            Ok(json!({ "answer": run.answer, "rounds": run.rounds }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{EmailGetterUnit, UnitSpec, YoutubeAnalyzerUnit};

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_cli_shapes() {
        let cli = Cli::parse_from([
            "orchestron",
            "--units-dir",
            "my_units",
            "run",
            "emailgetter",
            "--max_emails",
            "3",
        ]);
        assert_eq!(cli.units_dir, Some(PathBuf::from("my_units")));
        match cli.command {
            Command::Run { unit, args } => {
                assert_eq!(unit, "emailgetter");
                assert_eq!(args, vec!["--max_emails", "3"]);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::parse_from(["orchestron", "agent", "--query", "save my mail"]);
        assert!(matches!(cli.command, Command::Agent { query } if query == "save my mail"));
    }

    #[test]
    fn test_values_follow_declared_types() {
        let schema = YoutubeAnalyzerUnit::schema();
        let params = parse_unit_args(
            "youtubeanalyzer",
            Some(&schema),
            &args(&[
                "--url",
                "https://youtu.be/abc",
                "--max_length=300",
                "--include_metadata",
                "no",
            ]),
        )
        .unwrap();
        assert_eq!(params["url"], "https://youtu.be/abc");
        assert_eq!(params["max_length"], 300);
        assert_eq!(params["include_metadata"], false);
    }

    #[test]
    fn test_unconvertible_value_kept_as_string() {
        let schema = EmailGetterUnit::schema();
        let params =
            parse_unit_args("emailgetter", Some(&schema), &args(&["--max_emails", "many"]))
                .unwrap();
        assert_eq!(params["max_emails"], "many");
        assert!(schema.check("emailgetter", &params).is_err());
    }

    #[test]
    fn test_dict_and_bare_boolean() {
        let params = parse_unit_args(
            "dbwriter",
            Some(&crate::units::DbWriterUnit::schema()),
            &args(&["--data", r#"{"k": "v"}"#, "--table_name", "notes"]),
        )
        .unwrap();
        assert_eq!(params["data"]["k"], "v");
        assert_eq!(params["table_name"], "notes");

        let schema = YoutubeAnalyzerUnit::schema();
        let params =
            parse_unit_args("youtubeanalyzer", Some(&schema), &args(&["--include_metadata"]))
                .unwrap();
        assert_eq!(params["include_metadata"], true);
    }

    #[test]
    fn test_malformed_sequences() {
        let err = parse_unit_args("echo", None, &args(&["text"])).unwrap_err();
        assert!(matches!(err, OrchestronError::InvalidParameter { .. }));
        let err = parse_unit_args("echo", None, &args(&["--text"])).unwrap_err();
        assert!(err.to_string().contains("missing value for --text"));
    }
}
