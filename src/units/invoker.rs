//! 调用层
//!
//! run(name, params)：注册表取实例 → validate → execute；每次调用输出结构化审计日志（JSON），
//! 参数先脱敏再截断。不重试、不加超时：单元失败立即以 UnitExecution 返回给调用方。

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::core::OrchestronError;
use crate::units::{Params, Registry, ResolvedConfig};

/// 参数预览最大字符数
const PREVIEW_CHARS: usize = 200;

/// 键名包含这些片段时值被替换为 "***"
const SECRET_MARKERS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "authorization",
];

/// 统一调用入口，持有只读的注册表
#[derive(Clone)]
pub struct Invoker {
    registry: Arc<Registry>,
}

impl Invoker {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run(&self, name: &str, params: Params) -> Result<Value, OrchestronError> {
        self.run_with(name, params, &ResolvedConfig::default()).await
    }

    /// 带调用方配置覆盖的调用（最高优先级）
    pub async fn run_with(
        &self,
        name: &str,
        params: Params,
        overrides: &ResolvedConfig,
    ) -> Result<Value, OrchestronError> {
        let unit = self.registry.get(name)?;
        let preview = params_preview(&params);
        tracing::info!(unit = %name, params = %preview, "unit start");
        let start = Instant::now();

        let config = match unit.validate(&params, overrides, self.registry.resolver()) {
            Ok(c) => c,
            Err(e) => {
                audit(name, "invalid", start, &preview);
                return Err(e);
            }
        };
        let params = unit.schema().with_defaults(&params);

        match unit.execute(&params, &config).await {
            Ok(result) => {
                audit(name, "ok", start, &preview);
                tracing::debug!(unit = %name, result = %truncate(&result.to_string()), "unit result");
                Ok(result)
            }
            Err(e) => {
                audit(name, "error", start, &preview);
                tracing::error!(unit = %name, error = %format!("{e:#}"), "unit failed");
                Err(OrchestronError::UnitExecution {
                    unit: name.to_string(),
                    params: preview,
                    message: format!("{e:#}"),
                })
            }
        }
    }
}

fn audit(unit: &str, outcome: &str, start: Instant, params_preview: &str) {
    let audit = serde_json::json!({
        "event": "unit_audit",
        "unit": unit,
        "ok": outcome == "ok",
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "params_preview": params_preview,
    });
    tracing::info!(audit = %audit.to_string(), "unit");
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SECRET_MARKERS.iter().any(|m| key.contains(m))
}

/// 递归脱敏
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_secret_key(k) {
                        Value::String("***".to_string())
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// 脱敏 + 截断后的参数文本，用于日志与错误上下文
pub fn params_preview(params: &Params) -> String {
    truncate(&redact(&Value::Object(params.clone())).to_string())
}

fn truncate(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_nested_secrets() {
        let v = json!({
            "user": "me",
            "password": "hunter2",
            "nested": {"api_key": "sk-1", "ok": 1},
            "list": [{"refresh_token": "t"}]
        });
        let r = redact(&v);
        assert_eq!(r["user"], json!("me"));
        assert_eq!(r["password"], json!("***"));
        assert_eq!(r["nested"]["api_key"], json!("***"));
        assert_eq!(r["nested"]["ok"], json!(1));
        assert_eq!(r["list"][0]["refresh_token"], json!("***"));
    }

    #[test]
    fn test_preview_truncates() {
        let mut params = Params::new();
        params.insert("body".to_string(), json!("x".repeat(500)));
        let preview = params_preview(&params);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
