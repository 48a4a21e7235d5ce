//! Echo 单元（测试 / 演示用，无副作用）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::units::{
    ActionUnit, ParamType, ParameterSpec, Params, ResolvedConfig, UnitSchema, UnitSpec,
};

/// 回显 text，或原样返回链上传来的 data
pub struct EchoUnit;

impl UnitSpec for EchoUnit {
    const TYPE_NAME: &'static str = "EchoUnit";
    const DESCRIPTION: &'static str =
        "Echo text back, or pass chained data through unchanged (for testing).";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .optional(ParameterSpec::new("text", ParamType::String, "Text to echo"))
            .optional(ParameterSpec::new(
                "data",
                ParamType::Dict,
                "Data from the previous chain step",
            ))
            .build()
    }

    fn build(_config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl ActionUnit for EchoUnit {
    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        if let Some(data) = params.get("data").filter(|v| !v.is_null()) {
            return Ok(data.clone());
        }
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or("(empty)");
        let prefix = config.get_string("prefix").unwrap_or_default();
        Ok(json!({ "text": format!("{prefix}{text}") }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_text_with_prefix() {
        let mut params = Params::new();
        params.insert("text".to_string(), json!("hi"));
        let config = ResolvedConfig::default().with("prefix", "> ");
        let out = EchoUnit.execute(&params, &config).await.unwrap();
        assert_eq!(out, json!({"text": "> hi"}));
    }

    #[tokio::test]
    async fn test_echo_passes_data_through() {
        let mut params = Params::new();
        params.insert("data".to_string(), json!({"k": "v"}));
        let out = EchoUnit
            .execute(&params, &ResolvedConfig::default())
            .await
            .unwrap();
        assert_eq!(out, json!({"k": "v"}));
    }
}
