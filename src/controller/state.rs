//! 控制循环状态：只追加的回合序列
//!
//! 一次运行独占一个 ControllerState；回合按发生顺序追加，工具结果按请求顺序写回。

use serde::Serialize;
use serde_json::Value;

use crate::controller::InvocationRequest;
use crate::llm::Message;

/// 单个回合
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// 系统设定
    System { content: String },
    /// 用户意图
    Human { content: String },
    /// 决策者输出：文本 + 本轮调用请求（为空即最终答案）
    Decision {
        content: String,
        requests: Vec<InvocationRequest>,
    },
    /// 某个调用请求的结果；失败时 ok = false，content 为错误信息
    ToolResult {
        request_id: String,
        unit: String,
        ok: bool,
        content: Value,
    },
    /// 纠正提示（如决策输出无法解析）
    Feedback { content: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerState {
    turns: Vec<Turn>,
}

impl ControllerState {
    pub fn new(system: Option<&str>, intent: &str) -> Self {
        let mut state = Self::default();
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            state.push(Turn::System {
                content: system.to_string(),
            });
        }
        state.push(Turn::Human {
            content: intent.to_string(),
        });
        state
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// 系统设定（多个时以换行拼接）
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .turns
            .iter()
            .filter_map(|t| match t {
                Turn::System { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// 最近一次不含调用请求的决策文本
    pub fn final_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            Turn::Decision { content, requests } if requests.is_empty() => Some(content.as_str()),
            _ => None,
        })
    }

    /// 除 System 以外的回合转为 LLM 消息
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::System { .. } => None,
                Turn::Human { content } => Some(Message::user(content.clone())),
                Turn::Decision { content, .. } => Some(Message::assistant(content.clone())),
                Turn::ToolResult {
                    request_id,
                    unit,
                    ok,
                    content,
                } => {
                    let status = if *ok { "result" } else { "error" };
                    Some(Message::user(format!(
                        "Unit {unit} [{request_id}] {status}: {content}"
                    )))
                }
                Turn::Feedback { content } => Some(Message::user(content.clone())),
            })
            .collect()
    }
}
