//! 动作单元：契约、配置解析、发现与注册、调用层，以及内置单元
//!
//! 每个单元是对一次外部调用的薄封装（收邮件、发邮件、建日历事件、写库、分析视频）。

pub mod catalog;
pub mod contract;
pub mod invoker;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod schema;

pub mod db_writer;
pub mod echo;
pub mod email_getter;
pub mod email_sender;
pub mod event_creator;
pub mod video_analyzer;

pub use catalog::{derive_name, UnitCatalog, UnitDefinition, UnitFactory};
pub use contract::{
    bool_param, int_param, str_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec,
    Params, SchemaError, UnitSchema, UnitSchemaBuilder, UnitSpec,
};
pub use invoker::{params_preview, redact, Invoker};
pub use manifest::{ManifestEntry, UnitManifest};
pub use registry::{RegisteredUnit, Registry, ScanReport, SkippedSource, UnitInfo};
pub use resolver::{ConfigResolver, EnvSource, ProcessEnv, ResolvedConfig};
pub use schema::{tool_call_schema_json, tool_catalog_json, tool_specs, ToolSpec};

pub use db_writer::{default_table, DbWriterUnit};
pub use echo::EchoUnit;
pub use email_getter::EmailGetterUnit;
pub use email_sender::EmailSenderUnit;
pub use event_creator::EventCreatorUnit;
pub use video_analyzer::{extract_video_id, YoutubeAnalyzerUnit};
