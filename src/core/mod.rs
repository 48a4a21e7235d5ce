//! 核心层：错误类型与框架装配

pub mod builder;
pub mod error;

pub use builder::{Framework, FrameworkBuilder};
pub use error::OrchestronError;
