//! 配置解析器
//!
//! 优先级（低 → 高）：全局配置中该单元的段落 → 环境变量回退（仅限单元声明的键，且仅在校验时缺失才查）→ 调用方显式覆盖。
//! ResolvedConfig 构造后不可变；补全与合并都返回新值。解析器从不记录配置值。

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::core::OrchestronError;
use crate::units::ConfigRequirement;

/// 环境变量来源（测试中用 HashMap 代替进程环境）
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// 进程环境变量
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// 单元最终拿到的配置：键 → 值
#[derive(Clone, Default, PartialEq)]
pub struct ResolvedConfig(BTreeMap<String, Value>);

impl ResolvedConfig {
    /// 从配置段落构造；非对象值视为空段落
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 字符串视图；数字与布尔值转为文本，空白字符串视为缺失
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 键存在且非空
    pub fn has(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    /// 以 overrides 覆盖当前值，返回新配置
    pub fn merged(&self, overrides: &ResolvedConfig) -> ResolvedConfig {
        let mut map = self.0.clone();
        for (k, v) in &overrides.0 {
            map.insert(k.clone(), v.clone());
        }
        Self(map)
    }

    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> ResolvedConfig {
        let mut map = self.0.clone();
        map.insert(key.into(), value.into());
        Self(map)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for ResolvedConfig {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 只打印键名，值一律脱敏
impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// 配置解析器：持有全局配置的单元段落与环境来源
pub struct ConfigResolver {
    sections: HashMap<String, Value>,
    env: Arc<dyn EnvSource>,
}

impl ConfigResolver {
    pub fn new(sections: HashMap<String, Value>) -> Self {
        Self {
            sections,
            env: Arc::new(ProcessEnv),
        }
    }

    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    /// 单元自己的段落；不存在时为空配置
    pub fn base_for(&self, unit: &str) -> ResolvedConfig {
        self.sections
            .get(unit)
            .map(ResolvedConfig::from_value)
            .unwrap_or_default()
    }

    /// 链作用域别名段落：`<scope>.<unit>`
    pub fn scoped(&self, scope: &str, unit: &str) -> ResolvedConfig {
        self.sections
            .get(scope)
            .and_then(|s| s.get(unit))
            .map(ResolvedConfig::from_value)
            .unwrap_or_default()
    }

    /// 按单元声明补全配置：缺失或空白的键查环境变量，必填键仍缺失则 MissingConfig
    pub fn complete(
        &self,
        unit: &str,
        config: &ResolvedConfig,
        requirements: &[ConfigRequirement],
    ) -> Result<ResolvedConfig, OrchestronError> {
        let mut resolved = config.clone();
        for req in requirements {
            if resolved.has(req.key) {
                continue;
            }
            match self.env.var(req.env).filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    tracing::debug!(unit = %unit, key = %req.key, env = %req.env, "config key resolved from environment");
                    resolved = resolved.with(req.key, value);
                }
                None if req.required => {
                    return Err(OrchestronError::MissingConfig {
                        unit: unit.to_string(),
                        key: req.key.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(resolved)
    }
}

impl fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish()
    }
}
