//! 单元契约：参数 schema、基础校验与 ActionUnit trait
//!
//! 每个动作单元发布一份 UnitSchema（参数列表 + 必填集合），并实现 ActionUnit（check / execute）。
//! 必填检查与类型检查由 UnitSchema::check 完成，单元只负责自身特有的检查。

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::OrchestronError;
use crate::units::ResolvedConfig;

/// 调用参数：JSON 对象
pub type Params = Map<String, Value>;

/// 参数类型（固定的小集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
    /// 映射；也接受由映射组成的数组（一批记录）
    Dict,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Dict => "dict",
        }
    }

    /// 值是否符合该类型
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Dict => match value {
                Value::Object(_) => true,
                Value::Array(items) => items.iter().all(Value::is_object),
                _ => false,
            },
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Dict => "a mapping (or a list of mappings)",
        };
        f.write_str(s)
    }
}

/// 单个参数声明
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("required parameter '{0}' is not declared")]
    UndeclaredRequired(String),
    #[error("parameter '{0}' is declared twice")]
    Duplicate(String),
}

/// 参数 schema：有序参数列表 + 必填名集合；必填名一定出现在参数列表中
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitSchema {
    parameters: Vec<ParameterSpec>,
    required: BTreeSet<String>,
}

impl UnitSchema {
    pub fn new(parameters: Vec<ParameterSpec>, required: &[&str]) -> Result<Self, SchemaError> {
        let mut seen = BTreeSet::new();
        for p in &parameters {
            if !seen.insert(p.name.as_str()) {
                return Err(SchemaError::Duplicate(p.name.clone()));
            }
        }
        for name in required {
            if !seen.contains(name) {
                return Err(SchemaError::UndeclaredRequired(name.to_string()));
            }
        }
        Ok(Self {
            parameters,
            required: required.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn builder() -> UnitSchemaBuilder {
        UnitSchemaBuilder::default()
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.parameter(name).is_some()
    }

    /// 必填检查 + 类型检查；缺失的必填参数按名字排序后一次性报告
    pub fn check(&self, unit: &str, params: &Params) -> Result<(), OrchestronError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|name| matches!(params.get(name.as_str()), None | Some(Value::Null)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(OrchestronError::MissingParameter {
                unit: unit.to_string(),
                missing,
            });
        }
        for spec in &self.parameters {
            match params.get(&spec.name) {
                // 显式 null 视为未提供
                Some(Value::Null) | None => {}
                Some(value) if spec.kind.accepts(value) => {}
                Some(_) => {
                    return Err(OrchestronError::TypeMismatch {
                        unit: unit.to_string(),
                        parameter: spec.name.clone(),
                        expected: spec.kind,
                    })
                }
            }
        }
        Ok(())
    }

    /// 为缺省的可选参数填入声明的默认值
    pub fn with_defaults(&self, params: &Params) -> Params {
        let mut out = params.clone();
        for spec in &self.parameters {
            if let Some(default) = &spec.default {
                let absent = matches!(out.get(&spec.name), None | Some(Value::Null));
                if absent {
                    out.insert(spec.name.clone(), default.clone());
                }
            }
        }
        out
    }

    /// 只保留本 schema 声明过的参数
    pub fn filter(&self, args: &Params) -> Params {
        args.iter()
            .filter(|(k, _)| self.declares(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// 构造器：required() 同时声明并标记必填，保证不变式成立
#[derive(Debug, Default)]
pub struct UnitSchemaBuilder {
    parameters: Vec<ParameterSpec>,
    required: BTreeSet<String>,
}

impl UnitSchemaBuilder {
    pub fn required(mut self, spec: ParameterSpec) -> Self {
        self.required.insert(spec.name.clone());
        self.push(spec);
        self
    }

    pub fn optional(mut self, spec: ParameterSpec) -> Self {
        self.required.remove(&spec.name);
        self.push(spec);
        self
    }

    fn push(&mut self, spec: ParameterSpec) {
        self.parameters.retain(|p| p.name != spec.name);
        self.parameters.push(spec);
    }

    pub fn build(self) -> UnitSchema {
        UnitSchema {
            parameters: self.parameters,
            required: self.required,
        }
    }
}

/// 单元所需的配置键及其环境变量回退
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRequirement {
    pub key: &'static str,
    pub env: &'static str,
    /// false 时缺失不报错（例如有内置默认值的 smtp_server）
    pub required: bool,
}

impl ConfigRequirement {
    pub const fn required(key: &'static str, env: &'static str) -> Self {
        Self {
            key,
            env,
            required: true,
        }
    }

    pub const fn optional(key: &'static str, env: &'static str) -> Self {
        Self {
            key,
            env,
            required: false,
        }
    }
}

/// 动作单元：对一次外部调用的无状态封装
#[async_trait]
pub trait ActionUnit: Send + Sync {
    /// 单元特有的参数检查，在 schema 校验与配置补全之后、execute 之前调用
    fn check(&self, _params: &Params) -> Result<(), String> {
        Ok(())
    }

    /// 执行唯一的外部副作用；params 已填入默认值，config 已补全
    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value>;
}

/// 静态元数据：无需实例即可读取
pub trait UnitSpec: ActionUnit + Sized + 'static {
    /// 实现类型名，注册名由此推导（EmailGetterUnit -> emailgetter）
    const TYPE_NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn schema() -> UnitSchema;

    fn config_requirements() -> &'static [ConfigRequirement] {
        &[]
    }

    fn build(config: &ResolvedConfig) -> anyhow::Result<Self>;
}

pub fn str_param<'a>(params: &'a Params, name: &str) -> anyhow::Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("parameter '{name}' is missing or not a string"))
}

pub fn int_param(params: &Params, name: &str) -> anyhow::Result<i64> {
    params
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow::anyhow!("parameter '{name}' is missing or not an integer"))
}

pub fn bool_param(params: &Params, name: &str) -> anyhow::Result<bool> {
    params
        .get(name)
        .and_then(Value::as_bool)
        .ok_or_else(|| anyhow::anyhow!("parameter '{name}' is missing or not a boolean"))
}
