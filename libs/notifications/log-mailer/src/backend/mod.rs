//! Mail backend implementations

pub mod json;
pub mod mock;
pub mod smtp;

pub use json::JsonBackend;
pub use mock::MockBackend;
pub use smtp::{SmtpBackend, SmtpConfig};

use crate::message::{Envelope, OutgoingMessage};
use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Backend-specific success payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryInfo {
    /// Envelope the message was sent with
    pub envelope: Envelope,
    /// Message-ID assigned to the message
    pub message_id: String,
    /// Raw serialized form, for backends that produce one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Server response, for network backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Trait for mail backends
#[async_trait]
pub trait MailBackend: Send + Sync {
    /// Send a message
    async fn send(&self, message: &OutgoingMessage) -> Result<DeliveryInfo>;

    /// Get backend name
    fn name(&self) -> &'static str;
}

/// Builds a backend handle for one dispatch
pub trait BackendFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn MailBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn() -> Result<Arc<dyn MailBackend>> + Send + Sync,
{
    fn create(&self) -> Result<Arc<dyn MailBackend>> {
        self()
    }
}

/// Options forwarded verbatim to backend construction
#[derive(Clone, Default)]
pub enum BackendOptions {
    /// No network; echoes the message back as JSON
    #[default]
    Json,
    /// SMTP relay via lettre
    Smtp(SmtpConfig),
    /// User-supplied backend
    Custom(Arc<dyn BackendFactory>),
}

impl BackendOptions {
    /// Use an existing backend instance for every dispatch
    pub fn shared(backend: Arc<dyn MailBackend>) -> Self {
        Self::Custom(Arc::new(move || -> Result<Arc<dyn MailBackend>> {
            Ok(Arc::clone(&backend))
        }))
    }

    /// Build a fresh backend per dispatch with the given factory
    pub fn custom<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn MailBackend>> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(factory))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Smtp(_) => "smtp",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for BackendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::Smtp(config) => f.debug_tuple("Smtp").field(config).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Create a backend handle from its options
pub fn create_backend(options: &BackendOptions) -> Result<Arc<dyn MailBackend>> {
    match options {
        BackendOptions::Json => Ok(Arc::new(JsonBackend::new())),
        BackendOptions::Smtp(config) => Ok(Arc::new(SmtpBackend::new(config.clone())?)),
        BackendOptions::Custom(factory) => factory.create(),
    }
}
