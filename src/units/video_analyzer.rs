//! 分析 YouTube 视频：YouTube Data API v3 取元数据 → LLM 归纳要点

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::llm::{LlmClient, Message, OpenAiClient};
use crate::units::{
    bool_param, int_param, str_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec,
    Params, ResolvedConfig, UnitSchema, UnitSpec,
};

const VIDEOS_API: &str = "https://www.googleapis.com/youtube/v3/videos";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_PROMPT: &str =
    "Extract the main keypoints and important topics discussed in this video.";
/// 送入 LLM 的正文上限（字符）
const MAX_CONTENT_CHARS: usize = 4000;

const SYSTEM_PROMPT: &str = "You analyze videos only based on the text provided to you \
(title, description, channel). You do not access the raw video. Even if the text is short \
or partial, infer likely keypoints, topics and structure, and always give your best analysis.";

const CONFIG: &[ConfigRequirement] = &[
    ConfigRequirement::required("youtube_api_key", "YOUTUBE_API_KEY"),
    ConfigRequirement::required("openai_api_key", "OPENAI_API_KEY"),
    ConfigRequirement::optional("model", "OPENAI_MODEL"),
];

static VIDEO_ID_RE: OnceLock<Regex> = OnceLock::new();

/// 支持 youtube.com/watch?v=、youtu.be/、youtube.com/shorts/ 与 /embed/
pub fn extract_video_id(url: &str) -> Option<String> {
    let re = VIDEO_ID_RE.get_or_init(|| {
        Regex::new(
            r"^https?://(?:www\.|m\.)?(?:youtube\.com/(?:watch\?(?:.*&)?v=|shorts/|embed/)|youtu\.be/)([A-Za-z0-9_-]{11})",
        )
        .unwrap()
    });
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Default, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
struct VideoItem {
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: Option<String>,
}

pub struct YoutubeAnalyzerUnit {
    http: reqwest::Client,
}

impl UnitSpec for YoutubeAnalyzerUnit {
    const TYPE_NAME: &'static str = "YoutubeAnalyzerUnit";
    const DESCRIPTION: &'static str =
        "Analyze a YouTube video from its title, description and channel, returning keypoints and topics.";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .required(ParameterSpec::new("url", ParamType::String, "YouTube video URL"))
            .optional(
                ParameterSpec::new("prompt", ParamType::String, "Prompt for the analysis")
                    .with_default(DEFAULT_PROMPT),
            )
            .optional(
                ParameterSpec::new(
                    "max_length",
                    ParamType::Integer,
                    "Max length of analysis output (tokens)",
                )
                .with_default(500),
            )
            .optional(
                ParameterSpec::new(
                    "include_metadata",
                    ParamType::Boolean,
                    "Include video metadata",
                )
                .with_default(true),
            )
            .optional(
                ParameterSpec::new(
                    "language",
                    ParamType::String,
                    "Language of the analysis (e.g., 'en')",
                )
                .with_default("en"),
            )
            .build()
    }

    fn config_requirements() -> &'static [ConfigRequirement] {
        CONFIG
    }

    fn build(_config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
        })
    }
}

impl YoutubeAnalyzerUnit {
    async fn fetch_metadata(&self, video_id: &str, api_key: &str) -> anyhow::Result<Snippet> {
        let resp = self
            .http
            .get(VIDEOS_API)
            .query(&[("part", "snippet"), ("id", video_id), ("key", api_key)])
            .send()
            .await?
            .error_for_status()?;
        let list: VideoListResponse = resp.json().await?;
        list.items
            .into_iter()
            .next()
            .map(|item| item.snippet)
            .ok_or_else(|| anyhow::anyhow!("video '{video_id}' not found"))
    }
}

/// 拼接送入 LLM 的正文；描述为空时只用标题
fn analysis_content(snippet: &Snippet) -> String {
    let mut content = format!("Title: {}\nChannel: {}", snippet.title, snippet.channel_title);
    if snippet.description.trim().is_empty() {
        tracing::warn!("no description available, analyzing title only");
    } else {
        content.push_str("\nDescription:\n");
        content.push_str(&snippet.description);
    }
    content.chars().take(MAX_CONTENT_CHARS).collect()
}

#[async_trait]
impl ActionUnit for YoutubeAnalyzerUnit {
    fn check(&self, params: &Params) -> Result<(), String> {
        if let Some(url) = params.get("url").and_then(Value::as_str) {
            if extract_video_id(url).is_none() {
                return Err(format!("Invalid YouTube URL: {url}"));
            }
        }
        match params.get("max_length").and_then(Value::as_i64) {
            Some(n) if n <= 0 => Err("max_length must be positive".to_string()),
            _ => Ok(()),
        }
    }

    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        let url = str_param(params, "url")?;
        let prompt = str_param(params, "prompt")?;
        let max_length = u32::try_from(int_param(params, "max_length")?)?;
        let include_metadata = bool_param(params, "include_metadata")?;
        let language = str_param(params, "language")?;
        let video_id = extract_video_id(url)
            .ok_or_else(|| anyhow::anyhow!("Invalid YouTube URL: {url}"))?;

        let youtube_key = config
            .get_string("youtube_api_key")
            .ok_or_else(|| anyhow::anyhow!("youtube_api_key not configured"))?;
        let openai_key = config
            .get_string("openai_api_key")
            .ok_or_else(|| anyhow::anyhow!("openai_api_key not configured"))?;
        let model = config
            .get_string("model")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        tracing::info!(video_id = %video_id, "analyzing video");
        let snippet = self.fetch_metadata(&video_id, &youtube_key).await?;

        let llm = OpenAiClient::new(
            config.get_string("base_url").as_deref(),
            &model,
            Some(&openai_key),
        )
        .with_max_tokens(max_length);
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(format!(
                "{prompt}\nAnswer in language: {language}\n\nContent:\n{}",
                analysis_content(&snippet)
            )),
        ];
        let analysis = llm.complete(&messages).await?.trim().to_string();
        tracing::info!(video_id = %video_id, chars = analysis.chars().count(), "analysis generated");

        let mut result = json!({
            "analysis": analysis,
            "video_url": url,
            "timestamp": chrono::Local::now().to_rfc3339(),
        });
        if include_metadata {
            result["metadata"] = json!({
                "title": snippet.title,
                "description": snippet.description,
                "channel": snippet.channel_title,
                "published_at": snippet.published_at,
                "video_id": video_id,
                "url": url,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?list=x&v=dQw4w9WgXcQ&t=1").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert!(extract_video_id("https://vimeo.com/123").is_none());
        assert!(extract_video_id("not a url").is_none());
    }

    #[test]
    fn test_check_url_and_length() {
        let unit = YoutubeAnalyzerUnit::build(&ResolvedConfig::default()).unwrap();
        let mut params = Params::new();
        params.insert("url".to_string(), json!("https://example.com/v"));
        assert!(unit.check(&params).unwrap_err().contains("Invalid YouTube URL"));

        params.insert("url".to_string(), json!("https://youtu.be/dQw4w9WgXcQ"));
        params.insert("max_length".to_string(), json!(0));
        assert_eq!(unit.check(&params).unwrap_err(), "max_length must be positive");

        params.insert("max_length".to_string(), json!(200));
        assert!(unit.check(&params).is_ok());
    }

    #[test]
    fn test_content_truncated() {
        let snippet = Snippet {
            title: "T".to_string(),
            description: "d".repeat(10_000),
            channel_title: "C".to_string(),
            published_at: None,
        };
        let content = analysis_content(&snippet);
        assert_eq!(content.chars().count(), MAX_CONTENT_CHARS);
        assert!(content.starts_with("Title: T\nChannel: C"));
    }
}
