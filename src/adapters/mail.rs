use crate::domain::model::ExportArtifact;
use crate::domain::ports::Notifier;
use crate::utils::error::{ReportError, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_SUBJECT: &str = "Post-Test DB Query Results";
pub const DEFAULT_BODY: &str = "Hi,\n\nPlease find attached the results of post-test database queries.\n\nRegards,\nAutomated System";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpRelay {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub starttls: bool,
}

fn default_port() -> u16 {
    25
}

impl SmtpRelay {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            starttls: false,
        }
    }

    /// "host" 或 "host:port"
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (host, port) = match value.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ReportError::InvalidConfigValueError {
                        field: "email.relays".to_string(),
                        value: value.to_string(),
                        reason: "port must be a number between 0 and 65535".to_string(),
                    })?;
                (host, port)
            }
            None => (value, default_port()),
        };

        if host.is_empty() {
            return Err(ReportError::InvalidConfigValueError {
                field: "email.relays".to_string(),
                value: value.to_string(),
                reason: "relay host is empty".to_string(),
            });
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for SmtpRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailSettings {
    pub sender: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub relays: Vec<SmtpRelay>,
    pub timeout: Duration,
}

impl MailSettings {
    pub fn new(sender: impl Into<String>, recipients: Vec<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients,
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
            relays: vec![SmtpRelay::new("localhost", default_port())],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }
}

/// 逗號分隔的收件人清單
pub fn parse_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// 依序嘗試每個 relay，第一個成功就停
pub struct SmtpNotifier {
    settings: MailSettings,
}

impl SmtpNotifier {
    pub fn new(settings: MailSettings) -> Self {
        Self { settings }
    }

    pub fn build_message(&self, artifact: &ExportArtifact) -> Result<Message> {
        let mut builder = Message::builder()
            .from(mailbox(&self.settings.sender)?)
            .subject(self.settings.subject.clone());
        for recipient in &self.settings.recipients {
            builder = builder.to(mailbox(recipient)?);
        }

        let content_type =
            ContentType::parse(artifact.content_type).map_err(|e| ReportError::DeliveryError {
                message: format!("invalid attachment type {}: {}", artifact.content_type, e),
            })?;
        let attachment =
            Attachment::new(artifact.file_name.clone()).body(artifact.bytes.clone(), content_type);

        builder
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(self.settings.body.clone()))
                    .singlepart(attachment),
            )
            .map_err(|e| ReportError::DeliveryError {
                message: e.to_string(),
            })
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| ReportError::InvalidConfigValueError {
            field: "email".to_string(),
            value: address.to_string(),
            reason: e.to_string(),
        })
}

async fn send_via(
    relay: &SmtpRelay,
    message: Message,
    timeout: Duration,
) -> std::result::Result<(), lettre::transport::smtp::Error> {
    let builder = if relay.starttls {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&relay.host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay.host.as_str())
    };
    let transport = builder.port(relay.port).timeout(Some(timeout)).build();
    transport.send(message).await?;
    Ok(())
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn deliver(&self, artifact: &ExportArtifact) -> Result<String> {
        let message = self.build_message(artifact)?;
        let mut failures = Vec::new();

        for relay in &self.settings.relays {
            tracing::debug!("Trying SMTP relay {}", relay);
            match send_via(relay, message.clone(), self.settings.timeout).await {
                Ok(()) => return Ok(relay.to_string()),
                Err(e) => {
                    tracing::warn!("⚠️ Relay {} failed: {}", relay, e);
                    failures.push(format!("{}: {}", relay, e));
                }
            }
        }

        if failures.is_empty() {
            return Err(ReportError::DeliveryError {
                message: "no SMTP relay configured".to_string(),
            });
        }
        Err(ReportError::DeliveryError {
            message: format!("every relay failed ({})", failures.join("; ")),
        })
    }
}
