//! 控制循环过程事件：供 CLI 等前端展示进度

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    /// 第几轮 DECIDE
    RoundStarted { round: usize, max_rounds: usize },
    /// 决策完成，本轮请求数
    Decided { requests: usize },
    /// 开始调用单元
    Invoking {
        id: String,
        unit: String,
        args: Value,
    },
    /// 调用结束（预览，避免过长）
    Observation {
        id: String,
        unit: String,
        ok: bool,
        preview: String,
    },
    /// 决策输出无法解析，已追加纠正提示
    Feedback { text: String },
    /// 最终答案
    Finished { answer: String },
    Error { text: String },
}
