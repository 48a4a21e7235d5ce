//! 决策者：给定状态与可用单元，产出零个或多个调用请求，或最终答案
//!
//! LlmDecisionMaker 把单元目录与调用格式 Schema 拼入 system prompt，再从回复中提取 JSON：
//! `{"calls": [{"id": "...", "unit": "...", "args": {...}}]}`，或单次调用 `{"unit"|"tool": "...", "args": {...}}`。
//! 回复不含 JSON 即为最终答案。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::controller::ControllerState;
use crate::core::OrchestronError;
use crate::llm::{LlmClient, Message};
use crate::units::{tool_call_schema_json, tool_catalog_json, Params, ToolSpec};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an automation assistant. \
Accomplish the user's request by invoking the available action units, \
inspect their results, and reply with a concise final answer when the task is complete.";

/// 一次单元调用请求
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRequest {
    pub id: String,
    pub unit: String,
    pub args: Params,
}

impl InvocationRequest {
    pub fn new(unit: impl Into<String>, args: Params) -> Self {
        Self {
            id: new_request_id(),
            unit: unit.into(),
            args,
        }
    }
}

fn new_request_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// DECIDE 的输出；requests 为空表示任务完成
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub content: String,
    pub requests: Vec<InvocationRequest>,
}

impl Decision {
    pub fn final_answer(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            requests: Vec::new(),
        }
    }

    pub fn invoke(content: impl Into<String>, requests: Vec<InvocationRequest>) -> Self {
        Self {
            content: content.into(),
            requests,
        }
    }

    pub fn is_final(&self) -> bool {
        self.requests.is_empty()
    }
}

#[async_trait]
pub trait DecisionMaker: Send + Sync {
    async fn decide(
        &self,
        state: &ControllerState,
        tools: &[ToolSpec],
    ) -> Result<Decision, OrchestronError>;
}

/// 提取的 JSON 片段及其来源
struct JsonSnippet<'a> {
    text: &'a str,
    /// 来自 ```json 代码块
    fenced: bool,
}

/// 提取 JSON 片段：```json 代码块优先，其次第一个 '{' 到最后一个 '}'
fn extract_json(text: &str) -> Option<JsonSnippet<'_>> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        let body = rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
        return Some(JsonSnippet { text: body, fenced: true });
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| JsonSnippet {
        text: &text[start..=end],
        fenced: false,
    })
}

fn parse_call(value: &Value, seen: &mut HashSet<String>) -> Result<InvocationRequest, String> {
    let obj = value.as_object().ok_or("each call must be a JSON object")?;
    let unit = obj
        .get("unit")
        .or_else(|| obj.get("tool"))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or("each call needs a non-empty \"unit\"")?;
    let args = match obj.get("args") {
        None | Some(Value::Null) => Params::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(format!("\"args\" of call to '{unit}' must be an object")),
    };
    let id = obj
        .get("id")
        .and_then(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|id| !seen.contains(id))
        .unwrap_or_else(new_request_id);
    seen.insert(id.clone());
    Ok(InvocationRequest {
        id,
        unit: unit.to_string(),
        args,
    })
}

/// 解析决策者输出；JSON 存在但不合法时返回 DecisionParse
///
/// 正文中夹带花括号的纯文本（既无 ```json 代码块，也不以 '{' 开头）解析失败时按最终答案处理。
pub fn parse_decision(output: &str) -> Result<Decision, OrchestronError> {
    let trimmed = output.trim();
    let Some(snippet) = extract_json(trimmed) else {
        return Ok(Decision::final_answer(trimmed));
    };
    let json_str = snippet.text;
    let value: Value = match serde_json::from_str(json_str) {
        Ok(value) => value,
        Err(_) if !snippet.fenced && !trimmed.starts_with('{') => {
            return Ok(Decision::final_answer(trimmed));
        }
        Err(e) => return Err(OrchestronError::DecisionParse(format!("{e}: {json_str}"))),
    };

    let calls: Vec<Value> = match &value {
        Value::Object(obj) if obj.contains_key("calls") => match obj.get("calls") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) => Vec::new(),
            _ => {
                return Err(OrchestronError::DecisionParse(format!(
                    "\"calls\" must be an array: {json_str}"
                )))
            }
        },
        Value::Object(obj) if obj.contains_key("unit") || obj.contains_key("tool") => {
            vec![value.clone()]
        }
        // 其它 JSON 视为答案内容
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let requests = calls
        .iter()
        .map(|c| parse_call(c, &mut seen))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| OrchestronError::DecisionParse(format!("{e}: {json_str}")))?;
    Ok(Decision::invoke(trimmed, requests))
}

/// 解析失败后追加给决策者的纠正提示
pub fn correction_prompt(error: &OrchestronError) -> String {
    format!(
        "Your previous reply could not be parsed ({error}). \
To invoke units, reply with ONLY one JSON object such as \
{{\"calls\": [{{\"unit\": \"echo\", \"args\": {{\"text\": \"hi\"}}}}]}}. \
To finish, reply with plain text and no JSON."
    )
}

/// 基于 LLM 的决策者
pub struct LlmDecisionMaker {
    llm: Arc<dyn LlmClient>,
}

impl LlmDecisionMaker {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    fn system_prompt(state: &ControllerState, tools: &[ToolSpec]) -> String {
        let base = state
            .system_prompt()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        format!(
            "{base}\n\n## Available units\n{}\n\n## Invoking units\n\
Reply with ONLY a JSON object matching this schema (several calls per reply are allowed):\n{}\n\
Results come back as messages keyed by call id. \
When no further units are needed, reply with the final answer as plain text without any JSON.",
            tool_catalog_json(tools),
            tool_call_schema_json()
        )
    }
}

#[async_trait]
impl DecisionMaker for LlmDecisionMaker {
    async fn decide(
        &self,
        state: &ControllerState,
        tools: &[ToolSpec],
    ) -> Result<Decision, OrchestronError> {
        let mut messages = vec![Message::system(Self::system_prompt(state, tools))];
        messages.extend(state.to_messages());
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| OrchestronError::Llm(e.to_string()))?;
        tracing::debug!(output = %output, "decision output");
        parse_decision(&output)
    }
}
