//! 收取最近邮件（IMAP over TLS）

use async_trait::async_trait;
use mailparse::{MailHeaderMap, ParsedMail};
use serde_json::{json, Value};

use crate::units::{
    int_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec, Params, ResolvedConfig,
    UnitSchema, UnitSpec,
};

const IMAP_PORT: u16 = 993;

const CONFIG: &[ConfigRequirement] = &[
    ConfigRequirement::required("imap_server", "IMAP_SERVER"),
    ConfigRequirement::required("user", "IMAP_USER"),
    ConfigRequirement::required("password", "IMAP_PASSWORD"),
];

pub struct EmailGetterUnit;

impl UnitSpec for EmailGetterUnit {
    const TYPE_NAME: &'static str = "EmailGetterUnit";
    const DESCRIPTION: &'static str =
        "Fetch the most recent emails from the INBOX. Returns a list of {from, subject, body}.";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .optional(
                ParameterSpec::new("max_emails", ParamType::Integer, "Maximum emails to fetch")
                    .with_default(5),
            )
            .build()
    }

    fn config_requirements() -> &'static [ConfigRequirement] {
        CONFIG
    }

    fn build(_config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[async_trait]
impl ActionUnit for EmailGetterUnit {
    fn check(&self, params: &Params) -> Result<(), String> {
        match params.get("max_emails").and_then(Value::as_i64) {
            Some(n) if n <= 0 => Err("max_emails must be positive".to_string()),
            _ => Ok(()),
        }
    }

    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        let max_emails = int_param(params, "max_emails")?;
        let max_emails = u32::try_from(max_emails)?;
        let server = config
            .get_string("imap_server")
            .ok_or_else(|| anyhow::anyhow!("imap_server not configured"))?;
        let user = config
            .get_string("user")
            .ok_or_else(|| anyhow::anyhow!("user not configured"))?;
        let password = config
            .get_string("password")
            .ok_or_else(|| anyhow::anyhow!("password not configured"))?;

        let emails =
            tokio::task::spawn_blocking(move || fetch_recent(&server, &user, &password, max_emails))
                .await??;
        tracing::info!(count = emails.len(), "fetched emails");
        Ok(Value::Array(emails))
    }
}

/// 阻塞式 IMAP 会话：登录 → 选 INBOX → 取最后 max 封 → 登出
fn fetch_recent(server: &str, user: &str, password: &str, max: u32) -> anyhow::Result<Vec<Value>> {
    let tls = native_tls::TlsConnector::builder().build()?;
    let client = imap::connect((server, IMAP_PORT), server, &tls)?;
    let mut session = client.login(user, password).map_err(|e| e.0)?;

    let mailbox = session.select("INBOX")?;
    let total = mailbox.exists;
    if total == 0 || max == 0 {
        session.logout()?;
        return Ok(Vec::new());
    }
    let first = total.saturating_sub(max - 1).max(1);
    let fetches = session.fetch(format!("{first}:{total}"), "RFC822")?;

    let mut messages: Vec<(u32, Value)> = Vec::new();
    for fetch in fetches.iter() {
        let Some(raw) = fetch.body() else {
            continue;
        };
        match parse_message(raw) {
            Ok(v) => messages.push((fetch.message, v)),
            Err(e) => tracing::warn!(seq = fetch.message, error = %e, "skipping unparsable message"),
        }
    }
    session.logout()?;

    messages.sort_by_key(|(seq, _)| *seq);
    Ok(messages.into_iter().map(|(_, v)| v).collect())
}

/// 原始 RFC822 → {from, subject, body}；body 取第一个 text/plain 部分
pub(crate) fn parse_message(raw: &[u8]) -> anyhow::Result<Value> {
    let parsed = mailparse::parse_mail(raw)?;
    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    let body = plain_text_body(&parsed)?.unwrap_or_default();
    Ok(json!({
        "from": from,
        "subject": subject,
        "body": body,
    }))
}

fn plain_text_body(mail: &ParsedMail) -> anyhow::Result<Option<String>> {
    if mail.subparts.is_empty() {
        return Ok(Some(mail.get_body()?));
    }
    for part in &mail.subparts {
        if part.subparts.is_empty() {
            if part.ctype.mimetype == "text/plain" {
                return Ok(Some(part.get_body()?));
            }
        } else if let Some(body) = plain_text_body(part)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}
