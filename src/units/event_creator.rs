//! 创建 Google Calendar 事件（OAuth refresh token → access token → events.insert）

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::units::{
    str_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec, Params, ResolvedConfig,
    UnitSchema, UnitSpec,
};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3/";

const CONFIG: &[ConfigRequirement] = &[
    ConfigRequirement::required("client_id", "GOOGLE_CLIENT_ID"),
    ConfigRequirement::required("client_secret", "GOOGLE_CLIENT_SECRET"),
    ConfigRequirement::required("refresh_token", "GOOGLE_REFRESH_TOKEN"),
];

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct InsertedEvent {
    id: String,
}

pub struct EventCreatorUnit {
    http: reqwest::Client,
}

impl UnitSpec for EventCreatorUnit {
    const TYPE_NAME: &'static str = "EventCreatorUnit";
    const DESCRIPTION: &'static str =
        "Create an event in Google Calendar. Times are ISO-8601, e.g. 2025-09-28T10:00:00+03:00.";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .required(ParameterSpec::new("title", ParamType::String, "Event title"))
            .required(ParameterSpec::new(
                "start_time",
                ParamType::String,
                "Event start time (ISO format, e.g., 2025-09-28T10:00:00+03:00)",
            ))
            .required(ParameterSpec::new(
                "end_time",
                ParamType::String,
                "Event end time (ISO format, e.g., 2025-09-28T11:00:00+03:00)",
            ))
            .optional(
                ParameterSpec::new("description", ParamType::String, "Event description")
                    .with_default(""),
            )
            .optional(
                ParameterSpec::new("calendar_id", ParamType::String, "Google Calendar ID")
                    .with_default("primary"),
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

/// 带偏移的 RFC 3339，或不带偏移的本地时间
fn is_iso_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn event_time(date_time: &str, time_zone: Option<&str>) -> Value {
    match time_zone {
        Some(tz) => json!({ "dateTime": date_time, "timeZone": tz }),
        None => json!({ "dateTime": date_time }),
    }
}

fn events_url(calendar_id: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(CALENDAR_API)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("calendar API base cannot be a base URL"))?
        .pop_if_empty()
        .extend(["calendars", calendar_id, "events"]);
    Ok(url)
}

impl EventCreatorUnit {
    async fn access_token(&self, config: &ResolvedConfig) -> anyhow::Result<String> {
        let field = |key: &str| {
            config
                .get_string(key)
                .ok_or_else(|| anyhow::anyhow!("{key} not configured"))
        };
        let form = [
            ("client_id", field("client_id")?),
            ("client_secret", field("client_secret")?),
            ("refresh_token", field("refresh_token")?),
            ("grant_type", "refresh_token".to_string()),
        ];
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        let token: TokenResponse = resp.json().await?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ActionUnit for EventCreatorUnit {
    fn check(&self, params: &Params) -> Result<(), String> {
        for key in ["start_time", "end_time"] {
            if let Some(value) = params.get(key).and_then(Value::as_str) {
                if !is_iso_datetime(value) {
                    return Err(
                        "start_time and end_time must be in ISO format (e.g., 2025-09-28T10:00:00+03:00)"
                            .to_string(),
                    );
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        let title = str_param(params, "title")?;
        let start_time = str_param(params, "start_time")?;
        let end_time = str_param(params, "end_time")?;
        let description = str_param(params, "description")?;
        let calendar_id = str_param(params, "calendar_id")?;
        let time_zone = config.get_string("time_zone");

        let token = self.access_token(config).await?;
        let body = json!({
            "summary": title,
            "description": description,
            "start": event_time(start_time, time_zone.as_deref()),
            "end": event_time(end_time, time_zone.as_deref()),
        });
        let resp = self
            .http
            .post(events_url(calendar_id)?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let event: InsertedEvent = resp.json().await?;
        tracing::info!(title = %title, event_id = %event.id, "calendar event created");

        Ok(json!({
            "status": "success",
            "event_id": event.id,
            "event_details": {
                "title": title,
                "start_time": start_time,
                "end_time": end_time,
                "description": description,
                "calendar_id": calendar_id,
            },
            "timestamp": chrono::Local::now().to_rfc3339(),
        }))
    }
}
