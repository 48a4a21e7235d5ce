//! 发送邮件（SMTP STARTTLS，lettre 异步传输）

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::{json, Value};

use crate::units::{
    str_param, ActionUnit, ConfigRequirement, ParamType, ParameterSpec, Params, ResolvedConfig,
    UnitSchema, UnitSpec,
};

const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;

const CONFIG: &[ConfigRequirement] = &[
    ConfigRequirement::optional("smtp_server", "SMTP_SERVER"),
    ConfigRequirement::optional("port", "SMTP_PORT"),
    ConfigRequirement::required("user", "SMTP_USER"),
    ConfigRequirement::required("password", "SMTP_PASSWORD"),
];

pub struct EmailSenderUnit;

impl UnitSpec for EmailSenderUnit {
    const TYPE_NAME: &'static str = "EmailSenderUnit";
    const DESCRIPTION: &'static str = "Send a plain-text email to a single recipient.";

    fn schema() -> UnitSchema {
        UnitSchema::builder()
            .required(ParameterSpec::new(
                "to_email",
                ParamType::String,
                "Recipient email address",
            ))
            .required(ParameterSpec::new("subject", ParamType::String, "Email subject"))
            .required(ParameterSpec::new("body", ParamType::String, "Email body"))
            .build()
    }

    fn config_requirements() -> &'static [ConfigRequirement] {
        CONFIG
    }

    fn build(_config: &ResolvedConfig) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

/// smtp_server / port 缺省时使用内置默认值
fn smtp_endpoint(config: &ResolvedConfig) -> anyhow::Result<(String, u16)> {
    let server = config
        .get_string("smtp_server")
        .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string());
    let port = match config.get_string("port") {
        Some(p) => p
            .trim()
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("invalid SMTP port '{p}'"))?,
        None => DEFAULT_SMTP_PORT,
    };
    Ok((server, port))
}

#[async_trait]
impl ActionUnit for EmailSenderUnit {
    fn check(&self, params: &Params) -> Result<(), String> {
        match params.get("to_email").and_then(Value::as_str) {
            Some(addr) if addr.parse::<Mailbox>().is_err() => {
                Err(format!("to_email '{addr}' is not a valid email address"))
            }
            _ => Ok(()),
        }
    }

    async fn execute(&self, params: &Params, config: &ResolvedConfig) -> anyhow::Result<Value> {
        let to_email = str_param(params, "to_email")?;
        let subject = str_param(params, "subject")?;
        let body = str_param(params, "body")?;
        let (server, port) = smtp_endpoint(config)?;
        let user = config
            .get_string("user")
            .ok_or_else(|| anyhow::anyhow!("user not configured"))?;
        let password = config
            .get_string("password")
            .ok_or_else(|| anyhow::anyhow!("password not configured"))?;

        let email = Message::builder()
            .from(user.parse::<Mailbox>()?)
            .to(to_email.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server)?
            .port(port)
            .credentials(Credentials::new(user, password))
            .build();
        mailer.send(email).await?;

        tracing::info!(to = %to_email, "email sent");
        Ok(json!({ "status": "sent" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_defaults() {
        let (server, port) = smtp_endpoint(&ResolvedConfig::default()).unwrap();
        assert_eq!(server, "smtp.gmail.com");
        assert_eq!(port, 587);
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = ResolvedConfig::default()
            .with("smtp_server", "mail.example.com")
            .with("port", 2525);
        assert_eq!(
            smtp_endpoint(&config).unwrap(),
            ("mail.example.com".to_string(), 2525)
        );
        let bad = ResolvedConfig::default().with("port", "abc");
        assert!(smtp_endpoint(&bad).is_err());
    }

    #[test]
    fn test_check_rejects_bad_address() {
        let mut params = Params::new();
        params.insert("to_email".to_string(), json!("not-an-email"));
        assert!(EmailSenderUnit.check(&params).is_err());
        params.insert("to_email".to_string(), json!("a@example.com"));
        assert!(EmailSenderUnit.check(&params).is_ok());
    }
}
