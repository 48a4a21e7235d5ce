//! 控制循环：停止条件、轮数上限、错误结果回合、纠正重试

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map};

use orchestron::controller::{
    Controller, ControllerEvent, ControllerState, Decision, DecisionMaker, InvocationRequest,
    LlmDecisionMaker, Turn,
};
use orchestron::core::OrchestronError;
use orchestron::llm::MockLlmClient;
use orchestron::units::{ConfigResolver, Invoker, Registry, ToolSpec, UnitCatalog};

/// 按脚本输出决策；脚本用完后一直请求 echo
struct ScriptedDecisions {
    script: Mutex<VecDeque<Result<Decision, OrchestronError>>>,
    calls: AtomicUsize,
}

impl ScriptedDecisions {
    fn new(script: Vec<Result<Decision, OrchestronError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn echo_request(text: &str) -> InvocationRequest {
    let mut args = Map::new();
    args.insert("text".to_string(), json!(text));
    InvocationRequest::new("echo", args)
}

#[async_trait]
impl DecisionMaker for ScriptedDecisions {
    async fn decide(
        &self,
        _state: &ControllerState,
        _tools: &[ToolSpec],
    ) -> Result<Decision, OrchestronError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Decision::invoke("again", vec![echo_request("loop")])))
    }
}

fn invoker() -> Invoker {
    let mut registry = Registry::new(
        UnitCatalog::builtin(),
        Arc::new(ConfigResolver::new(HashMap::new())),
    );
    registry.register_catalog();
    Invoker::new(Arc::new(registry))
}

fn tool_results(state: &ControllerState) -> Vec<&Turn> {
    state
        .turns()
        .iter()
        .filter(|t| matches!(t, Turn::ToolResult { .. }))
        .collect()
}

#[tokio::test]
async fn test_stops_when_no_requests() {
    let decisions = ScriptedDecisions::new(vec![Ok(Decision::final_answer("nothing to do"))]);
    let controller = Controller::new(invoker(), decisions.clone());

    let run = controller.run("say nothing").await.unwrap();
    assert_eq!(run.answer, "nothing to do");
    assert_eq!(run.rounds, 1);
    assert_eq!(decisions.calls(), 1);
    assert!(tool_results(&run.state).is_empty());
    assert_eq!(run.state.final_answer(), Some("nothing to do"));
}

#[tokio::test]
async fn test_round_budget_is_enforced() {
    let decisions = ScriptedDecisions::new(Vec::new());
    let controller = Controller::new(invoker(), decisions.clone()).with_max_rounds(5);

    let err = controller.run("loop forever").await.unwrap_err();
    assert!(matches!(
        err,
        OrchestronError::ControllerBudgetExceeded { max_rounds: 5 }
    ));
    assert_eq!(decisions.calls(), 5);
}

#[tokio::test]
async fn test_results_appended_in_request_order() {
    let decisions = ScriptedDecisions::new(vec![
        Ok(Decision::invoke(
            "two at once",
            vec![echo_request("first"), echo_request("second")],
        )),
        Ok(Decision::final_answer("echoed twice")),
    ]);
    let controller = Controller::new(invoker(), decisions);

    let run = controller.run("echo twice").await.unwrap();
    assert_eq!(run.rounds, 2);
    let contents: Vec<_> = tool_results(&run.state)
        .into_iter()
        .map(|t| match t {
            Turn::ToolResult { ok, content, .. } => {
                assert!(*ok);
                content.clone()
            }
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(contents, vec![json!({"text": "first"}), json!({"text": "second"})]);
}

#[tokio::test]
async fn test_failures_become_error_turns() {
    let mut bad_args = Map::new();
    bad_args.insert("text".to_string(), json!(5));
    let decisions = ScriptedDecisions::new(vec![
        Ok(Decision::invoke(
            "try things",
            vec![
                InvocationRequest::new("teleport", Map::new()),
                InvocationRequest::new("echo", bad_args),
            ],
        )),
        Ok(Decision::final_answer("could not do it")),
    ]);
    let controller = Controller::new(invoker(), decisions);

    let run = controller.run("do the impossible").await.unwrap();
    assert_eq!(run.answer, "could not do it");
    let results = tool_results(&run.state);
    assert_eq!(results.len(), 2);
    match results[0] {
        Turn::ToolResult { unit, ok, content, .. } => {
            assert_eq!(unit, "teleport");
            assert!(!ok);
            assert!(content.as_str().unwrap().contains("teleport"));
        }
        _ => unreachable!(),
    }
    match results[1] {
        Turn::ToolResult { ok, content, .. } => {
            assert!(!ok);
            assert!(content.as_str().unwrap().contains("must be a string"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_unparsable_decision_gets_feedback_and_retries() {
    let decisions = ScriptedDecisions::new(vec![
        Err(OrchestronError::DecisionParse("expected value".to_string())),
        Ok(Decision::final_answer("recovered")),
    ]);
    let controller = Controller::new(invoker(), decisions.clone());

    let run = controller.run("anything").await.unwrap();
    assert_eq!(run.answer, "recovered");
    assert_eq!(run.rounds, 2);
    assert!(run
        .state
        .turns()
        .iter()
        .any(|t| matches!(t, Turn::Feedback { content } if content.contains("expected value"))));
}

#[tokio::test]
async fn test_other_decision_errors_abort() {
    let decisions = ScriptedDecisions::new(vec![Err(OrchestronError::Decision(
        "model refused".to_string(),
    ))]);
    let controller = Controller::new(invoker(), decisions.clone());
    let err = controller.run("anything").await.unwrap_err();
    assert!(matches!(err, OrchestronError::Decision(_)));
    assert_eq!(decisions.calls(), 1);
}

#[tokio::test]
async fn test_llm_decision_maker_end_to_end() {
    let llm = Arc::new(MockLlmClient::new([
        "I'll echo first.\n```json\n{\"calls\": [{\"id\": \"c1\", \"unit\": \"echo\", \"args\": {\"text\": \"hi\"}}]}\n```",
        "{\"calls\": [oops]}",
        "The echo said hi.",
    ]));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = Controller::new(invoker(), Arc::new(LlmDecisionMaker::new(llm.clone())))
        .with_event_tx(tx);

    let run = controller.run("echo hi").await.unwrap();
    assert_eq!(run.answer, "The echo said hi.");
    assert_eq!(run.rounds, 3);

    let results = tool_results(&run.state);
    assert!(matches!(
        results[0],
        Turn::ToolResult { request_id, ok: true, content, .. }
            if request_id == "c1" && content == &json!({"text": "hi"})
    ));

    // 工具目录与调用结果都进入了提示
    let calls = llm.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0][0].content.contains("emailsender"));
    assert!(calls[1]
        .iter()
        .any(|m| m.content.contains("[c1]") && m.content.contains("hi")));

    drop(controller);
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    assert!(events
        .iter()
        .any(|e| matches!(e, ControllerEvent::Feedback { .. })));
    assert!(matches!(
        events.last(),
        Some(ControllerEvent::Finished { answer }) if answer == "The echo said hi."
    ));
}
