//! Error types for the log mailer.
//!
//! `ConfigurationError` is the only error a caller ever handles directly; it
//! is returned from [`MailSink::new`](crate::MailSink::new). Everything that
//! goes wrong after construction is a `DispatchError` and travels through the
//! sink's event channel instead.

use thiserror::Error;

/// Result type for sink construction.
pub type ConfigResult<T> = Result<T, ConfigurationError>;

/// Invalid construction-time options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("log mailer requires a 'to' recipient")]
    MissingRecipient,
}

/// Failure of a single dispatch. Reported via [`SinkEvent::Error`](crate::SinkEvent::Error),
/// never returned to the producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The configured record filter returned an error or panicked.
    #[error("record filter failed: {0}")]
    Filter(String),

    /// The mail backend could not be created from its options.
    #[error("failed to create mail backend: {0}")]
    BackendSetup(String),

    /// The backend rejected or failed to transmit the message.
    #[error("mail backend failed to send message: {0}")]
    Send(String),

    /// `log()` was called with no tokio runtime to run the dispatch on.
    #[error("no tokio runtime available to dispatch the record")]
    NoRuntime,
}

impl DispatchError {
    pub(crate) fn send(report: eyre::Report) -> Self {
        Self::Send(format!("{report:#}"))
    }

    pub(crate) fn backend_setup(report: eyre::Report) -> Self {
        Self::BackendSetup(format!("{report:#}"))
    }

    pub(crate) fn filter(report: eyre::Report) -> Self {
        Self::Filter(format!("{report:#}"))
    }
}

/// Turn a caught panic payload into something printable.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
