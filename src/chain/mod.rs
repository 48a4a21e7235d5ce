//! 链式执行：动态链与命名链

pub mod engine;
pub mod named;
pub mod policy;
pub mod types;

pub use engine::ChainEngine;
pub use named::NamedChain;
pub use policy::{is_empty_result, CarryDataParameter, PropagationPolicy, CARRIED_PARAMETER};
pub use types::{Chain, ChainOutput, ChainStep, StepOutput};
