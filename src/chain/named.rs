//! 预定义的命名链：源单元 → dbwriter
//!
//! | id | 源单元 | data_type | 结果整形 |
//! |----|--------|-----------|----------|
//! | emailgetter_to_db | emailgetter | email | 邮件列表原样写入 |
//! | youtubetranscript_to_db | youtubeanalyzer | transcript | 分析结果 + video_url |
//! | eventcreator_to_db | eventcreator | event | event_details + event_id |
//!
//! 第一步参数取调用方参数中源单元声明过的部分；`table_name` 转交给 dbwriter。
//! 运行时叠加 `<chain_id>.<unit>` 配置段。

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde_json::{json, Value};

use crate::chain::{ChainEngine, ChainOutput};
use crate::core::OrchestronError;
use crate::units::{params_preview, Params};

/// 写库单元的注册名
const SINK_UNIT: &str = "dbwriter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedChain {
    EmailToDb,
    VideoToDb,
    EventToDb,
}

impl NamedChain {
    pub const ALL: [NamedChain; 3] = [Self::EmailToDb, Self::VideoToDb, Self::EventToDb];

    pub fn id(&self) -> &'static str {
        match self {
            Self::EmailToDb => "emailgetter_to_db",
            Self::VideoToDb => "youtubetranscript_to_db",
            Self::EventToDb => "eventcreator_to_db",
        }
    }

    pub fn source_unit(&self) -> &'static str {
        match self {
            Self::EmailToDb => "emailgetter",
            Self::VideoToDb => "youtubeanalyzer",
            Self::EventToDb => "eventcreator",
        }
    }

    pub fn data_type(&self) -> &'static str {
        match self {
            Self::EmailToDb => "email",
            Self::VideoToDb => "transcript",
            Self::EventToDb => "event",
        }
    }

    pub fn units(&self) -> [&'static str; 2] {
        [self.source_unit(), SINK_UNIT]
    }

    /// 调用方参数的别名（youtube_url → url）
    fn normalize_args(&self, args: &Params) -> Params {
        let mut args = args.clone();
        if *self == Self::VideoToDb && !args.contains_key("url") {
            if let Some(url) = args.remove("youtube_url") {
                args.insert("url".to_string(), url);
            }
        }
        args
    }

    /// 源单元结果 → dbwriter 的 data
    pub fn reshape(&self, result: Value, args: &Params) -> Result<Value, OrchestronError> {
        let unexpected = |what: &str| OrchestronError::UnitExecution {
            unit: self.source_unit().to_string(),
            params: params_preview(args),
            message: format!("unexpected result shape: {what}"),
        };
        match self {
            Self::EmailToDb => Ok(result),
            Self::VideoToDb => {
                let Value::Object(mut map) = result else {
                    return Err(unexpected("expected a mapping"));
                };
                let url = args
                    .get("url")
                    .or_else(|| args.get("youtube_url"))
                    .cloned()
                    .or_else(|| map.get("video_url").cloned())
                    .unwrap_or(Value::Null);
                map.insert("video_url".to_string(), url);
                Ok(Value::Object(map))
            }
            Self::EventToDb => {
                let mut details = result
                    .get("event_details")
                    .and_then(Value::as_object)
                    .cloned()
                    .ok_or_else(|| unexpected("missing event_details"))?;
                let event_id = result
                    .get("event_id")
                    .cloned()
                    .ok_or_else(|| unexpected("missing event_id"))?;
                details.insert("event_id".to_string(), event_id);
                Ok(Value::Object(details))
            }
        }
    }
}

impl fmt::Display for NamedChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for NamedChain {
    type Err = OrchestronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.id() == s)
            .ok_or_else(|| OrchestronError::UnknownChain(s.to_string()))
    }
}

impl ChainEngine {
    pub async fn run_named(
        &self,
        chain: NamedChain,
        args: &Params,
    ) -> Result<ChainOutput, OrchestronError> {
        tracing::info!(chain = %chain, "named chain start");
        let start = Instant::now();
        let args = chain.normalize_args(args);
        let mut output = ChainOutput::new(chain.id());

        let source = self.invoker().registry().get(chain.source_unit())?;
        let first_params = source.schema().filter(&args);
        let first = self
            .invoke_step(chain.id(), 0, chain.source_unit(), first_params, Some(chain.id()))
            .await?;
        let data = chain.reshape(first.result.clone(), &args)?;
        output.steps.push(first);

        let mut sink_params = Params::new();
        sink_params.insert("data".to_string(), data);
        sink_params.insert("data_type".to_string(), json!(chain.data_type()));
        if let Some(table) = args.get("table_name").filter(|v| !v.is_null()) {
            sink_params.insert("table_name".to_string(), table.clone());
        }
        let second = self
            .invoke_step(chain.id(), 1, SINK_UNIT, sink_params, Some(chain.id()))
            .await?;
        output.steps.push(second);

        tracing::info!(
            chain = %chain,
            duration_ms = start.elapsed().as_millis() as u64,
            "named chain completed"
        );
        Ok(output)
    }
}
