//! 链执行引擎
//!
//! 严格顺序执行；任一步失败立即中止并把错误原样返回，已执行步骤的副作用不回滚。

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::chain::{Chain, ChainOutput, CarryDataParameter, PropagationPolicy, StepOutput};
use crate::core::OrchestronError;
use crate::units::{Invoker, Params, ResolvedConfig};

pub struct ChainEngine {
    invoker: Invoker,
    policy: Arc<dyn PropagationPolicy>,
}

impl ChainEngine {
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            policy: Arc::new(CarryDataParameter),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PropagationPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// 动态链
    pub async fn run(&self, chain: &Chain) -> Result<ChainOutput, OrchestronError> {
        self.run_scoped(chain, None).await
    }

    /// scope 不为空时，每步额外叠加 `<scope>.<unit>` 配置段作为调用方覆盖
    pub async fn run_scoped(
        &self,
        chain: &Chain,
        scope: Option<&str>,
    ) -> Result<ChainOutput, OrchestronError> {
        tracing::info!(chain = %chain.id(), steps = chain.len(), "chain start");
        let start = Instant::now();
        let mut output = ChainOutput::new(chain.id());
        let mut previous: Option<Value> = None;

        for (index, step) in chain.steps().iter().enumerate() {
            let unit = self.invoker.registry().get(&step.unit)?;
            let params = self
                .policy
                .propagate(previous.as_ref(), unit.schema(), &step.params);
            let result = self
                .invoke_step(chain.id(), index, &step.unit, params, scope)
                .await?;
            previous = Some(result.result.clone());
            output.steps.push(result);
        }

        tracing::info!(
            chain = %chain.id(),
            duration_ms = start.elapsed().as_millis() as u64,
            "chain completed"
        );
        Ok(output)
    }

    /// 执行单步；失败时记录所在位置后原样返回
    pub(crate) async fn invoke_step(
        &self,
        chain_id: &str,
        index: usize,
        unit: &str,
        params: Params,
        scope: Option<&str>,
    ) -> Result<StepOutput, OrchestronError> {
        let overrides = match scope {
            Some(scope) => self.invoker.registry().resolver().scoped(scope, unit),
            None => ResolvedConfig::default(),
        };
        let start = Instant::now();
        match self.invoker.run_with(unit, params, &overrides).await {
            Ok(result) => Ok(StepOutput {
                unit: unit.to_string(),
                result,
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Err(e) => {
                tracing::error!(chain = %chain_id, step = index + 1, unit = %unit, error = %e, "chain aborted");
                Err(e)
            }
        }
    }
}
