//! 工具暴露：注册表元数据 → 决策者可用的函数 schema
//!
//! ToolSpec 与常见的 function-calling 形状一致（name / description / parameters 为 JSON Schema）；
//! 调用格式的 JSON Schema 由 schemars 生成，拼入 system prompt 以减少格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::units::{ParamType, UnitInfo};

/// 单个工具的函数描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn json_type(kind: ParamType) -> Value {
    match kind {
        ParamType::String => json!({"type": "string"}),
        ParamType::Integer => json!({"type": "integer"}),
        ParamType::Boolean => json!({"type": "boolean"}),
        ParamType::Dict => json!({
            "anyOf": [
                {"type": "object"},
                {"type": "array", "items": {"type": "object"}}
            ]
        }),
    }
}

impl From<&UnitInfo> for ToolSpec {
    fn from(info: &UnitInfo) -> Self {
        let mut properties = Map::new();
        for p in info.schema.parameters() {
            let mut prop = json_type(p.kind);
            if let Value::Object(obj) = &mut prop {
                obj.insert("description".to_string(), json!(p.description));
                if let Some(default) = &p.default {
                    obj.insert("default".to_string(), default.clone());
                }
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&String> = info.schema.required().iter().collect();
        Self {
            name: info.name.clone(),
            description: info.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

pub fn tool_specs(infos: &[UnitInfo]) -> Vec<ToolSpec> {
    infos.iter().map(ToolSpec::from).collect()
}

/// 工具目录 JSON，供 system prompt 使用
pub fn tool_catalog_json(tools: &[ToolSpec]) -> String {
    serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string())
}

/// 调用请求格式（仅用于 Schema 生成）：{"calls": [{"id": "...", "unit": "...", "args": {...}}]}
#[allow(dead_code)]
#[derive(JsonSchema)]
struct InvocationFormat {
    /// 本轮要调用的单元；为空或不输出 JSON 表示任务完成
    pub calls: Vec<CallFormat>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct CallFormat {
    /// 可选的请求标识，结果会以此回填
    pub id: Option<String>,
    /// 已注册的单元名，如 emailgetter、dbwriter
    pub unit: String,
    /// 单元参数，须符合该单元的 parameters schema
    pub args: HashMap<String, serde_json::Value>,
}

/// 返回调用格式的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(InvocationFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
