//! 单元注册表
//!
//! 名称 → 已配置的实例 + 公开元数据。scan 读取清单目录并逐个实例化；单个来源失败只记日志并跳过。
//! 重名时后注册者覆盖先注册者，同时输出 warn 并记入 ScanReport。
//! 注册表只在 scan / register 时修改，调用方需串行化对同一注册表的并发 scan。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::OrchestronError;
use crate::units::manifest::{load_manifest, manifest_sources};
use crate::units::{
    ActionUnit, ConfigResolver, Params, ResolvedConfig, UnitCatalog, UnitDefinition, UnitSchema,
};

/// 对外公开的单元元数据（不含实例）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitInfo {
    pub name: String,
    pub description: String,
    pub schema: UnitSchema,
}

/// 已注册单元：定义 + 注册时解析的配置 + 实例
pub struct RegisteredUnit {
    name: String,
    description: String,
    definition: UnitDefinition,
    config: ResolvedConfig,
    instance: Arc<dyn ActionUnit>,
    /// 同一实例不并发执行
    gate: Mutex<()>,
}

impl RegisteredUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &UnitSchema {
        self.definition.schema()
    }

    /// 注册时从全局配置解析出的配置
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn info(&self) -> UnitInfo {
        UnitInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.schema().clone(),
        }
    }

    /// 完整校验：必填 → 类型 → 配置补全（环境变量回退）→ 单元自检；返回本次调用使用的配置
    pub fn validate(
        &self,
        params: &Params,
        overrides: &ResolvedConfig,
        resolver: &ConfigResolver,
    ) -> Result<ResolvedConfig, OrchestronError> {
        self.schema().check(&self.name, params)?;
        let config = resolver.complete(
            &self.name,
            &self.config.merged(overrides),
            self.definition.config_requirements(),
        )?;
        self.instance
            .check(params)
            .map_err(|message| OrchestronError::InvalidParameter {
                unit: self.name.clone(),
                message,
            })?;
        Ok(config)
    }

    pub(crate) async fn execute(
        &self,
        params: &Params,
        config: &ResolvedConfig,
    ) -> anyhow::Result<Value> {
        let _guard = self.gate.lock().await;
        self.instance.execute(params, config).await
    }
}

/// 被跳过的清单来源或条目
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// 一次 scan 的结果
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// 按加载顺序记录的注册名（重名会出现多次）
    pub registered: Vec<String>,
    /// 发生覆盖的注册名
    pub collisions: Vec<String>,
    pub skipped: Vec<SkippedSource>,
}

/// 注册表：按名存储 Arc<RegisteredUnit>
pub struct Registry {
    units: HashMap<String, Arc<RegisteredUnit>>,
    catalog: UnitCatalog,
    resolver: Arc<ConfigResolver>,
}

impl Registry {
    pub fn new(catalog: UnitCatalog, resolver: Arc<ConfigResolver>) -> Self {
        Self {
            units: HashMap::new(),
            catalog,
            resolver,
        }
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn catalog(&self) -> &UnitCatalog {
        &self.catalog
    }

    /// 以全局配置中对应段落实例化并登记；返回注册名与是否覆盖了旧条目
    pub fn register(
        &mut self,
        definition: &UnitDefinition,
        description: Option<&str>,
    ) -> anyhow::Result<(String, bool)> {
        let name = definition.registry_name();
        let config = self.resolver.base_for(&name);
        let instance = definition.instantiate(&config)?;
        let unit = RegisteredUnit {
            name: name.clone(),
            description: description
                .map(str::to_string)
                .unwrap_or_else(|| definition.description().to_string()),
            definition: definition.clone(),
            config,
            instance,
            gate: Mutex::new(()),
        };
        let replaced = self.units.insert(name.clone(), Arc::new(unit)).is_some();
        if replaced {
            tracing::warn!(unit = %name, "registry name collision, later definition replaces earlier one");
        }
        tracing::info!(unit = %name, implementation = %definition.type_name(), "registered unit");
        Ok((name, replaced))
    }

    /// 直接登记目录中的全部实现（未提供清单目录时使用）
    pub fn register_catalog(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let definitions: Vec<UnitDefinition> = self.catalog.definitions().cloned().collect();
        for def in &definitions {
            match self.register(def, None) {
                Ok((name, replaced)) => {
                    if replaced {
                        report.collisions.push(name.clone());
                    }
                    report.registered.push(name);
                }
                Err(e) => {
                    tracing::error!(implementation = %def.type_name(), error = %e, "failed to construct unit");
                    report.skipped.push(SkippedSource {
                        path: PathBuf::from(def.type_name()),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        report
    }

    /// 扫描清单目录；目录不存在时记录错误并返回空报告
    pub fn scan(&mut self, dir: &Path) -> ScanReport {
        let mut report = ScanReport::default();
        tracing::info!(dir = %dir.display(), "scanning for unit manifests");
        let sources = match manifest_sources(dir) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "cannot read units directory");
                return report;
            }
        };
        if sources.is_empty() {
            tracing::warn!(dir = %dir.display(), "no unit manifests found");
        }

        for path in sources {
            let manifest = match load_manifest(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %format!("{e:#}"), "failed to load manifest, skipping");
                    report.skipped.push(SkippedSource {
                        path,
                        reason: format!("{e:#}"),
                    });
                    continue;
                }
            };
            if manifest.units.is_empty() {
                tracing::warn!(path = %path.display(), "manifest declares no units");
            }
            for entry in &manifest.units {
                let Some(def) = self.catalog.get(&entry.implementation).cloned() else {
                    tracing::error!(path = %path.display(), implementation = %entry.implementation, "unknown unit implementation, skipping");
                    report.skipped.push(SkippedSource {
                        path: path.clone(),
                        reason: format!("unknown implementation '{}'", entry.implementation),
                    });
                    continue;
                };
                match self.register(&def, entry.description.as_deref()) {
                    Ok((name, replaced)) => {
                        if replaced {
                            report.collisions.push(name.clone());
                        }
                        report.registered.push(name);
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), implementation = %entry.implementation, error = %format!("{e:#}"), "failed to construct unit, skipping");
                        report.skipped.push(SkippedSource {
                            path: path.clone(),
                            reason: format!("{e:#}"),
                        });
                    }
                }
            }
        }
        tracing::info!(count = self.units.len(), "unit registry ready");
        report
    }

    pub fn get(&self, name: &str) -> Result<Arc<RegisteredUnit>, OrchestronError> {
        self.units
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestronError::UnitNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    /// 全部单元的公开元数据，按名字排序
    pub fn list(&self) -> Vec<UnitInfo> {
        let mut infos: Vec<UnitInfo> = self.units.values().map(|u| u.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.units.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
