//! 链定义与执行结果

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::units::Params;

/// 链中的一步：单元名 + 显式参数
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStep {
    pub unit: String,
    pub params: Params,
}

impl ChainStep {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            params: Params::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }
}

/// 有序步骤序列，严格从左到右执行
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    id: String,
    steps: Vec<ChainStep>,
}

impl Chain {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    /// 匿名的动态链
    pub fn dynamic() -> Self {
        Self::new(format!("chain_{}", uuid::Uuid::new_v4()))
    }

    pub fn step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    /// 单元名列表 + 按单元名给出的显式参数
    pub fn from_names<S: AsRef<str>>(names: &[S], overrides: &HashMap<String, Params>) -> Self {
        names.iter().fold(Self::dynamic(), |chain, name| {
            let name = name.as_ref();
            let step = ChainStep::new(name).params(overrides.get(name).cloned().unwrap_or_default());
            chain.step(step)
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// 单步结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutput {
    pub unit: String,
    pub result: Value,
    pub duration_ms: u64,
}

/// 整条链的结果：每步结果按执行顺序记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainOutput {
    pub chain_id: String,
    pub steps: Vec<StepOutput>,
}

impl ChainOutput {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            steps: Vec::new(),
        }
    }

    /// 最后一步的结果；空链为 None
    pub fn final_result(&self) -> Option<&Value> {
        self.steps.last().map(|s| &s.result)
    }

    pub fn into_final_result(self) -> Option<Value> {
        self.steps.into_iter().last().map(|s| s.result)
    }
}
