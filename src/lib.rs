//! Orchestron - 插件式动作单元编排框架
//!
//! 模块划分：
//! - **units**: 单元契约、配置解析、发现与注册、调用层、内置单元
//! - **chain**: 链式执行（动态链 + 命名链）
//! - **controller**: 决策者驱动的 DECIDE ⇄ ACT 控制循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **core**: 错误类型与框架装配
//! - **config**: 应用配置加载（文件 + 环境变量）
//! - **cli**: 命令行定义与参数解析
//! - **observability**: tracing 初始化

pub mod chain;
pub mod cli;
pub mod config;
pub mod controller;
pub mod core;
pub mod llm;
pub mod observability;
pub mod units;

pub use crate::core::{Framework, FrameworkBuilder, OrchestronError};
