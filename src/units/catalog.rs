//! 单元目录：编译期已知的实现类型 → 构造器 + 静态元数据
//!
//! 取代「扫描目录、加载源码、反射查找子类」：清单文件只按实现类型名引用这里登记过的单元。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::units::{
    ActionUnit, ConfigRequirement, DbWriterUnit, EchoUnit, EmailGetterUnit, EmailSenderUnit,
    EventCreatorUnit, ResolvedConfig, UnitSchema, UnitSpec, YoutubeAnalyzerUnit,
};

/// 构造函数：以解析后的配置创建实例
pub type UnitFactory =
    Arc<dyn Fn(&ResolvedConfig) -> anyhow::Result<Arc<dyn ActionUnit>> + Send + Sync>;

/// 单元定义：不需要实例即可读取 schema、描述与配置需求
#[derive(Clone)]
pub struct UnitDefinition {
    type_name: String,
    description: String,
    schema: UnitSchema,
    config: Vec<ConfigRequirement>,
    factory: UnitFactory,
}

impl UnitDefinition {
    pub fn new<F>(
        type_name: impl Into<String>,
        description: impl Into<String>,
        schema: UnitSchema,
        factory: F,
    ) -> Self
    where
        F: Fn(&ResolvedConfig) -> anyhow::Result<Arc<dyn ActionUnit>> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            description: description.into(),
            schema,
            config: Vec::new(),
            factory: Arc::new(factory),
        }
    }

    /// 由实现了 UnitSpec 的类型生成定义
    pub fn of<U: UnitSpec>() -> Self {
        Self::new(U::TYPE_NAME, U::DESCRIPTION, U::schema(), |config| {
            let unit: Arc<dyn ActionUnit> = Arc::new(U::build(config)?);
            Ok(unit)
        })
        .with_config(U::config_requirements())
    }

    pub fn with_config(mut self, requirements: &[ConfigRequirement]) -> Self {
        self.config = requirements.to_vec();
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &UnitSchema {
        &self.schema
    }

    pub fn config_requirements(&self) -> &[ConfigRequirement] {
        &self.config
    }

    /// 注册名：类型名去掉 Unit / Node 后缀再转小写
    pub fn registry_name(&self) -> String {
        derive_name(&self.type_name)
    }

    pub fn instantiate(&self, config: &ResolvedConfig) -> anyhow::Result<Arc<dyn ActionUnit>> {
        (self.factory)(config)
    }
}

impl fmt::Debug for UnitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefinition")
            .field("type_name", &self.type_name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// EmailGetterUnit -> emailgetter
pub fn derive_name(type_name: &str) -> String {
    let base = type_name
        .strip_suffix("Unit")
        .or_else(|| type_name.strip_suffix("Node"))
        .filter(|s| !s.is_empty())
        .unwrap_or(type_name);
    base.to_lowercase()
}

/// 实现类型名 → 定义
#[derive(Clone, Debug, Default)]
pub struct UnitCatalog {
    definitions: BTreeMap<String, UnitDefinition>,
}

impl UnitCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置单元
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.add(UnitDefinition::of::<EchoUnit>());
        catalog.add(UnitDefinition::of::<EmailGetterUnit>());
        catalog.add(UnitDefinition::of::<EmailSenderUnit>());
        catalog.add(UnitDefinition::of::<EventCreatorUnit>());
        catalog.add(UnitDefinition::of::<DbWriterUnit>());
        catalog.add(UnitDefinition::of::<YoutubeAnalyzerUnit>());
        catalog
    }

    pub fn add(&mut self, definition: UnitDefinition) {
        self.definitions
            .insert(definition.type_name().to_string(), definition);
    }

    pub fn get(&self, type_name: &str) -> Option<&UnitDefinition> {
        self.definitions.get(type_name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &UnitDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_name() {
        assert_eq!(derive_name("EmailGetterUnit"), "emailgetter");
        assert_eq!(derive_name("DBWriterNode"), "dbwriter");
        assert_eq!(derive_name("Echo"), "echo");
        assert_eq!(derive_name("Unit"), "unit");
    }

    #[test]
    fn test_builtin_names() {
        let catalog = UnitCatalog::builtin();
        let names: Vec<String> = catalog.definitions().map(|d| d.registry_name()).collect();
        for expected in [
            "echo",
            "emailgetter",
            "emailsender",
            "eventcreator",
            "dbwriter",
            "youtubeanalyzer",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_builtin_required_names_are_declared() {
        for def in UnitCatalog::builtin().definitions() {
            let schema = def.schema();
            for name in schema.required() {
                assert!(schema.declares(name), "{} requires undeclared {}", def.type_name(), name);
            }
        }
    }
}
