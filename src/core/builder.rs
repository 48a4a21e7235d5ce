//! 框架构建器：统一的初始化逻辑
//!
//! 配置 → 配置解析器 → 注册表（扫描清单目录或直接登记内置目录）→ 调用层 → 链引擎 / 控制循环。
//! CLI 与测试共用同一套装配流程。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::ChainEngine;
use crate::config::AppConfig;
use crate::controller::{Controller, ControllerOptions, DecisionMaker, LlmDecisionMaker};
use crate::llm::{LlmClient, OpenAiClient};
use crate::units::{
    ConfigResolver, EnvSource, Invoker, ProcessEnv, Registry, ScanReport, UnitCatalog,
};

/// 框架构建器
pub struct FrameworkBuilder {
    config: AppConfig,
    units_dir: Option<PathBuf>,
    catalog: UnitCatalog,
    env: Arc<dyn EnvSource>,
}

impl FrameworkBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            units_dir: None,
            catalog: UnitCatalog::builtin(),
            env: Arc::new(ProcessEnv),
        }
    }

    /// 覆盖配置中的 app.units_dir
    pub fn with_units_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.units_dir = Some(dir.into());
        self
    }

    /// 替换实现目录（测试中注入桩单元）
    pub fn with_catalog(mut self, catalog: UnitCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// 替换环境变量来源
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn units_dir(&self) -> PathBuf {
        self.units_dir
            .clone()
            .unwrap_or_else(|| self.config.app.units_dir.clone())
    }

    pub fn build_resolver(&self) -> ConfigResolver {
        ConfigResolver::new(self.config.units.clone()).with_env(self.env.clone())
    }

    /// 清单目录存在则扫描，否则直接登记目录中的全部实现
    pub fn build_registry(&self) -> (Registry, ScanReport) {
        let resolver = Arc::new(self.build_resolver());
        let mut registry = Registry::new(self.catalog.clone(), resolver);
        let dir = self.units_dir();
        let report = if dir.is_dir() {
            registry.scan(&dir)
        } else {
            tracing::info!(dir = %dir.display(), "units directory absent, registering built-in catalog");
            registry.register_catalog()
        };
        tracing::info!(
            units = registry.len(),
            collisions = report.collisions.len(),
            skipped = report.skipped.len(),
            "registry ready"
        );
        (registry, report)
    }

    /// 构建决策者使用的 LLM 客户端
    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        let llm = &self.config.llm;
        let client = OpenAiClient::new(
            llm.base_url.as_deref(),
            &llm.effective_model(self.env.as_ref()),
            llm.effective_api_key(self.env.as_ref()).as_deref(),
        )
        .with_timeout(Duration::from_secs(llm.request_timeout_secs));
        Arc::new(client)
    }

    pub fn build(&self) -> Framework {
        let (registry, report) = self.build_registry();
        let invoker = Invoker::new(Arc::new(registry));
        Framework {
            chains: ChainEngine::new(invoker.clone()),
            invoker,
            report,
            controller_options: ControllerOptions::from(&self.config.controller),
        }
    }
}

/// 装配完成的框架组件
pub struct Framework {
    pub invoker: Invoker,
    pub chains: ChainEngine,
    /// 注册过程报告（重名覆盖、跳过的清单）
    pub report: ScanReport,
    pub controller_options: ControllerOptions,
}

impl Framework {
    /// 以给定决策者构建控制循环
    pub fn controller(&self, decision_maker: Arc<dyn DecisionMaker>) -> Controller {
        Controller::new(self.invoker.clone(), decision_maker)
            .with_options(self.controller_options.clone())
    }

    /// 以 LLM 决策者构建控制循环
    pub fn llm_controller(&self, llm: Arc<dyn LlmClient>) -> Controller {
        self.controller(Arc::new(LlmDecisionMaker::new(llm)))
    }
}
