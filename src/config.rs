//! 应用配置：config/default.* + --config 文件 + 环境变量
//!
//! 加载顺序：config/default.{toml,yaml,...}（可选）→ --config 指定的文件（YAML / TOML 按扩展名）→
//! 环境变量 `ORCHESTRON__*`（双下划线表示嵌套，如 `ORCHESTRON__DBWRITER__DB_URL=sqlite:///app.db`）。
//! 除 [app] / [llm] / [controller] 外的顶层键都是单元段落（或 `<chain_id>.<unit>` 链作用域段落）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::controller::ControllerOptions;
use crate::core::OrchestronError;
use crate::units::EnvSource;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "ORCHESTRON";

/// 应用配置根
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub controller: ControllerSection,
    /// 单元名 / 链 id → 配置段落
    #[serde(flatten)]
    pub units: HashMap<String, Value>,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 单元清单目录
    pub units_dir: PathBuf,
    /// 调用方级别的整体超时（秒），作用于 run / chain / agent
    pub run_timeout_secs: Option<u64>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            units_dir: PathBuf::from("units"),
            run_timeout_secs: None,
        }
    }
}

/// [llm] 段：决策者使用的 OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: None,
            base_url: None,
            api_key: None,
            request_timeout_secs: 60,
        }
    }
}

const DEFAULT_MODEL: &str = "gpt-4o";

impl LlmSection {
    /// 配置值 → OPENAI_MODEL → gpt-4o
    pub fn effective_model(&self, env: &dyn EnvSource) -> String {
        non_blank(self.model.clone())
            .or_else(|| non_blank(env.var("OPENAI_MODEL")))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    /// 配置值 → OPENAI_API_KEY
    pub fn effective_api_key(&self, env: &dyn EnvSource) -> Option<String> {
        non_blank(self.api_key.clone()).or_else(|| non_blank(env.var("OPENAI_API_KEY")))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// [controller] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerSection {
    pub max_rounds: usize,
    pub parallel_invocations: bool,
    pub system_prompt: Option<String>,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            parallel_invocations: true,
            system_prompt: None,
        }
    }
}

impl From<&ControllerSection> for ControllerOptions {
    fn from(section: &ControllerSection) -> Self {
        Self {
            max_rounds: section.max_rounds,
            parallel_invocations: section.parallel_invocations,
            system_prompt: section.system_prompt.clone(),
        }
    }
}

/// 加载配置；文件缺失不是错误
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, OrchestronError> {
    let mut builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false));

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, continuing without it");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let config: AppConfig = c.try_deserialize()?;
    tracing::debug!(sections = ?config.units.keys().collect::<Vec<_>>(), "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.app.units_dir, PathBuf::from("units"));
        assert_eq!(config.controller.max_rounds, 10);
        assert!(config.controller.parallel_invocations);
        assert_eq!(config.llm.request_timeout_secs, 60);
        assert!(config.units.is_empty());
    }

    #[test]
    fn test_load_yaml_with_unit_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            r#"
app:
  units_dir: my_units
controller:
  max_rounds: 4
dbwriter:
  db_url: "sqlite:///app.db"
emailgetter_to_db:
  dbwriter:
    table_name_hint: mails
"#,
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.app.units_dir, PathBuf::from("my_units"));
        assert_eq!(config.controller.max_rounds, 4);
        assert!(config.controller.parallel_invocations);
        assert_eq!(config.units["dbwriter"]["db_url"], "sqlite:///app.db");
        assert_eq!(
            config.units["emailgetter_to_db"]["dbwriter"]["table_name_hint"],
            "mails"
        );
        assert!(!config.units.contains_key("app"));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = load_config(Some(Path::new("/definitely/not/here.yaml"))).unwrap();
        assert_eq!(config.controller.max_rounds, 10);
    }

    #[test]
    fn test_llm_model_and_key_fallbacks() {
        let env: HashMap<String, String> = [
            ("OPENAI_MODEL".to_string(), "gpt-4o-mini".to_string()),
            ("OPENAI_API_KEY".to_string(), "sk-env".to_string()),
        ]
        .into_iter()
        .collect();
        let mut llm = LlmSection::default();
        assert_eq!(llm.effective_model(&env), "gpt-4o-mini");
        assert_eq!(llm.effective_api_key(&env).as_deref(), Some("sk-env"));
        assert_eq!(llm.effective_model(&HashMap::new()), "gpt-4o");

        llm.model = Some("custom".to_string());
        llm.api_key = Some("sk-file".to_string());
        assert_eq!(llm.effective_model(&env), "custom");
        assert_eq!(llm.effective_api_key(&env).as_deref(), Some("sk-file"));
    }
}
