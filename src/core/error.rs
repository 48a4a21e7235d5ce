//! 编排错误类型
//!
//! 校验类错误（MissingParameter / TypeMismatch / InvalidParameter / MissingConfig）在 execute 之前同步抛出；
//! 单元内部失败统一包装为 UnitExecution（附单元名与脱敏后的参数）。

use thiserror::Error;

use crate::units::ParamType;

/// 编排核心可能返回的全部错误
#[derive(Error, Debug)]
pub enum OrchestronError {
    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Missing required parameters for '{unit}': {}", missing.join(", "))]
    MissingParameter { unit: String, missing: Vec<String> },

    #[error("Parameter '{parameter}' of '{unit}' must be {expected}")]
    TypeMismatch {
        unit: String,
        parameter: String,
        expected: ParamType,
    },

    /// 单元自定义的参数检查失败（如 max_emails 必须为正数）
    #[error("Invalid parameter for '{unit}': {message}")]
    InvalidParameter { unit: String, message: String },

    #[error("Missing or empty required config for '{unit}': {key}. Set it in the config file or the environment.")]
    MissingConfig { unit: String, key: String },

    /// 单元 execute 内部失败；params 为脱敏预览
    #[error("Unit '{unit}' failed (params: {params}): {message}")]
    UnitExecution {
        unit: String,
        params: String,
        message: String,
    },

    #[error("Controller exceeded its budget of {max_rounds} decide/act rounds")]
    ControllerBudgetExceeded { max_rounds: usize },

    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    /// 决策者输出无法解析（控制循环会注入纠正提示后重新决策）
    #[error("Decision output could not be parsed: {0}")]
    DecisionParse(String),

    #[error("Decision maker failed: {0}")]
    Decision(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl OrchestronError {
    /// 是否为调用前的校验错误（不会产生任何副作用）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. }
                | Self::TypeMismatch { .. }
                | Self::InvalidParameter { .. }
                | Self::MissingConfig { .. }
        )
    }
}

impl From<config::ConfigError> for OrchestronError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
