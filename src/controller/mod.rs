//! 控制循环：决策者驱动的 DECIDE ⇄ ACT 状态机

pub mod decision;
pub mod events;
pub mod loop_;
pub mod state;

pub use decision::{
    correction_prompt, parse_decision, Decision, DecisionMaker, InvocationRequest,
    LlmDecisionMaker, DEFAULT_SYSTEM_PROMPT,
};
pub use events::ControllerEvent;
pub use loop_::{Controller, ControllerOptions, ControllerRun};
pub use state::{ControllerState, Turn};
