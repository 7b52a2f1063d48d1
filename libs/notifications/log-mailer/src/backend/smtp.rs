//! SMTP mail backend using lettre

use super::{DeliveryInfo, MailBackend};
use crate::message::OutgoingMessage;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// SMTP backend configuration
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    /// Socket timeout; lettre's default applies when unset
    pub timeout: Option<Duration>,
}

impl SmtpConfig {
    /// Plain, unauthenticated connection to `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            use_tls: false,
            timeout: None,
        }
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: std::env::var("SMTP_HOST").wrap_err("SMTP_HOST not set")?,
            port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .wrap_err("Invalid SMTP_PORT")?,
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            use_tls: std::env::var("SMTP_USE_TLS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            timeout: std::env::var("SMTP_TIMEOUT_SECS")
                .ok()
                .map(|v| v.parse().map(Duration::from_secs))
                .transpose()
                .wrap_err("Invalid SMTP_TIMEOUT_SECS")?,
        })
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// SMTP mail backend
pub struct SmtpBackend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: Arc<SmtpConfig>,
}

impl SmtpBackend {
    /// Create a new SMTP backend
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .wrap_err("Failed to create SMTP relay")?
        } else {
            // No TLS (for Mailpit/Mailhog)
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port).timeout(config.timeout);

        if !config.username.is_empty() {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            builder = builder.credentials(creds);
        }

        Ok(Self {
            transport: builder.build(),
            config: Arc::new(config),
        })
    }

    fn build_message(&self, message: &OutgoingMessage) -> Result<Message> {
        let from: Mailbox = message.from.parse().wrap_err("Invalid from address")?;

        let mut builder = Message::builder()
            .from(from)
            .subject(&message.subject)
            .message_id(Some(message.message_id_header()));

        for to in &message.to {
            let to_mailbox: Mailbox = to
                .parse()
                .wrap_err_with(|| format!("Invalid to address: {to}"))?;
            builder = builder.to(to_mailbox);
        }

        builder
            .header(ContentType::TEXT_PLAIN)
            .body(message.text.clone())
            .wrap_err("Failed to build text message")
    }
}

#[async_trait]
impl MailBackend for SmtpBackend {
    async fn send(&self, message: &OutgoingMessage) -> Result<DeliveryInfo> {
        let email = self.build_message(message)?;

        let response = self
            .transport
            .send(email)
            .await
            .wrap_err_with(|| {
                format!(
                    "Failed to send email via SMTP ({}:{})",
                    self.config.host, self.config.port
                )
            })?;

        let response_text = format!(
            "{} {}",
            response.code(),
            response.message().collect::<Vec<_>>().join(" ")
        );

        tracing::info!(
            message_id = %message.id,
            to = ?message.to,
            subject = %message.subject,
            "Email sent successfully"
        );

        Ok(DeliveryInfo {
            envelope: message.envelope(),
            message_id: message.message_id_header(),
            message: None,
            response: Some(response_text),
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
