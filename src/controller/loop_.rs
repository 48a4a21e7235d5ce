//! 控制循环：DECIDE ⇄ ACT，直到决策者不再请求调用
//!
//! 每轮 DECIDE 计一轮；超过 max_rounds 返回 ControllerBudgetExceeded。
//! ACT 中单元失败或未知单元名写回为错误结果回合，不中止运行；决策输出无法解析时追加纠正提示并重新 DECIDE。

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::controller::{
    correction_prompt, ControllerEvent, ControllerState, DecisionMaker, InvocationRequest, Turn,
};
use crate::core::OrchestronError;
use crate::units::{tool_specs, Invoker};

/// 观察预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub max_rounds: usize,
    /// 同一轮的多个请求并发执行
    pub parallel_invocations: bool,
    /// 覆盖决策者的默认系统设定
    pub system_prompt: Option<String>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            max_rounds: 10,
            parallel_invocations: true,
            system_prompt: None,
        }
    }
}

/// 一次运行的结果：最终答案 + 完整回合历史
#[derive(Debug, Clone)]
pub struct ControllerRun {
    pub answer: String,
    pub rounds: usize,
    pub state: ControllerState,
}

pub struct Controller {
    invoker: Invoker,
    decision_maker: Arc<dyn DecisionMaker>,
    options: ControllerOptions,
    event_tx: Option<UnboundedSender<ControllerEvent>>,
}

impl Controller {
    pub fn new(invoker: Invoker, decision_maker: Arc<dyn DecisionMaker>) -> Self {
        Self {
            invoker,
            decision_maker,
            options: ControllerOptions::default(),
            event_tx: None,
        }
    }

    pub fn with_options(mut self, options: ControllerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.options.max_rounds = max_rounds;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ControllerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    fn send_event(&self, ev: ControllerEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    pub async fn run(&self, intent: &str) -> Result<ControllerRun, OrchestronError> {
        let state = ControllerState::new(self.options.system_prompt.as_deref(), intent);
        self.run_state(state).await
    }

    /// 从给定状态继续运行
    pub async fn run_state(
        &self,
        mut state: ControllerState,
    ) -> Result<ControllerRun, OrchestronError> {
        let max_rounds = self.options.max_rounds;
        let tools = tool_specs(&self.invoker.registry().list());

        for round in 1..=max_rounds {
            self.send_event(ControllerEvent::RoundStarted { round, max_rounds });
            tracing::debug!(round, max_rounds, "controller decide");

            let decision = match self.decision_maker.decide(&state, &tools).await {
                Ok(d) => d,
                Err(e @ OrchestronError::DecisionParse(_)) => {
                    tracing::warn!(round, error = %e, "decision unparsable, asking again");
                    let prompt = correction_prompt(&e);
                    self.send_event(ControllerEvent::Feedback {
                        text: prompt.clone(),
                    });
                    state.push(Turn::Feedback { content: prompt });
                    continue;
                }
                Err(e) => {
                    self.send_event(ControllerEvent::Error {
                        text: e.to_string(),
                    });
                    return Err(e);
                }
            };
            self.send_event(ControllerEvent::Decided {
                requests: decision.requests.len(),
            });

            if decision.is_final() {
                tracing::info!(rounds = round, "controller finished");
                self.send_event(ControllerEvent::Finished {
                    answer: decision.content.clone(),
                });
                let answer = decision.content.clone();
                state.push(Turn::Decision {
                    content: decision.content,
                    requests: Vec::new(),
                });
                return Ok(ControllerRun {
                    answer,
                    rounds: round,
                    state,
                });
            }

            let requests = decision.requests.clone();
            state.push(Turn::Decision {
                content: decision.content,
                requests: decision.requests,
            });
            for turn in self.act(&requests).await {
                state.push(turn);
            }
        }

        tracing::error!(max_rounds, "controller round budget exhausted");
        self.send_event(ControllerEvent::Error {
            text: format!("round budget of {max_rounds} exhausted"),
        });
        Err(OrchestronError::ControllerBudgetExceeded { max_rounds })
    }

    /// 执行本轮全部请求；返回的结果回合与请求顺序一致
    async fn act(&self, requests: &[InvocationRequest]) -> Vec<Turn> {
        if self.options.parallel_invocations {
            join_all(requests.iter().map(|r| self.invoke(r))).await
        } else {
            let mut turns = Vec::with_capacity(requests.len());
            for r in requests {
                turns.push(self.invoke(r).await);
            }
            turns
        }
    }

    async fn invoke(&self, request: &InvocationRequest) -> Turn {
        self.send_event(ControllerEvent::Invoking {
            id: request.id.clone(),
            unit: request.unit.clone(),
            args: Value::Object(request.args.clone()),
        });
        let (ok, content) = match self.invoker.run(&request.unit, request.args.clone()).await {
            Ok(result) => (true, result),
            Err(e) => {
                tracing::warn!(unit = %request.unit, request_id = %request.id, error = %e, "invocation failed, reported to decision maker");
                (false, Value::String(e.to_string()))
            }
        };
        let text = match &content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut preview: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
        if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
            preview.push_str("...");
        }
        self.send_event(ControllerEvent::Observation {
            id: request.id.clone(),
            unit: request.unit.clone(),
            ok,
            preview,
        });
        Turn::ToolResult {
            request_id: request.id.clone(),
            unit: request.unit.clone(),
            ok,
            content,
        }
    }
}
