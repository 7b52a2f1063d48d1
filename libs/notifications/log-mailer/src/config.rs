//! Construction-time options and their validation.
//!
//! [`MailerOptions`] is what callers fill in; [`MailerConfig`] is the
//! validated, read-only result the sink works from. Validation only checks
//! that there is somebody to mail and fills in defaults. Malformed addresses
//! or backend settings are the backend's business and show up at dispatch
//! time.

use crate::backend::BackendOptions;
use crate::error::{ConfigResult, ConfigurationError};
use crate::filter::{AcceptAll, FnFilter, RecordFilter, TryFnFilter};
use crate::record::Record;
use crate::template::{SubjectTemplate, DEFAULT_SUBJECT};
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Local part of the default sender address
pub const DEFAULT_SENDER_NAME: &str = "log-mailer";

/// One or more recipient addresses.
///
/// Strings are split on `,` so `"a@x.com, b@y.com"` names two recipients.
/// Blank entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    fn push_list(&mut self, list: &str) {
        self.0.extend(
            list.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string),
        );
    }
}

impl From<&str> for Recipients {
    fn from(value: &str) -> Self {
        let mut recipients = Self::default();
        recipients.push_list(value);
        recipients
    }
}

impl From<String> for Recipients {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl<S: AsRef<str>> From<Vec<S>> for Recipients {
    fn from(values: Vec<S>) -> Self {
        let mut recipients = Self::default();
        for value in &values {
            recipients.push_list(value.as_ref());
        }
        recipients
    }
}

impl<const N: usize> From<[&str; N]> for Recipients {
    fn from(values: [&str; N]) -> Self {
        Self::from(values.to_vec())
    }
}

/// Message-related options
#[derive(Clone, Default)]
pub struct MessageOptions {
    /// Required
    pub to: Recipients,
    pub from: Option<String>,
    /// May contain `{{ level }}` and `{{ message }}`
    pub subject: Option<String>,
    pub filter: Option<Arc<dyn RecordFilter>>,
}

impl MessageOptions {
    pub fn new(to: impl Into<Recipients>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Only mail records for which `predicate` returns true
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.with_filter(Arc::new(FnFilter(predicate)))
    }

    /// Like [`filter`](Self::filter), for predicates that can fail
    pub fn try_filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&Record) -> eyre::Result<bool> + Send + Sync + 'static,
    {
        self.with_filter(Arc::new(TryFnFilter(predicate)))
    }

    pub fn with_filter(mut self, filter: Arc<dyn RecordFilter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

impl fmt::Debug for MessageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageOptions")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("subject", &self.subject)
            .field("filter", &self.filter.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Everything a [`MailSink`](crate::MailSink) is built from
#[derive(Debug, Clone, Default)]
pub struct MailerOptions {
    /// Defaults to the JSON echo backend
    pub backend: Option<BackendOptions>,
    pub message: MessageOptions,
    /// Runtime dispatches are spawned on; defaults to the current one
    pub runtime: Option<Handle>,
}

impl MailerOptions {
    pub fn new(message: MessageOptions) -> Self {
        Self {
            message,
            ..Self::default()
        }
    }

    pub fn backend(mut self, backend: BackendOptions) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }
}

/// Validated configuration. Read-only after construction.
#[derive(Clone)]
pub struct MailerConfig {
    to: Recipients,
    from: String,
    subject: SubjectTemplate,
    filter: Arc<dyn RecordFilter>,
    backend: BackendOptions,
}

impl MailerConfig {
    /// Check required fields and fill in defaults.
    pub fn validate(options: MailerOptions) -> ConfigResult<Self> {
        let MailerOptions {
            backend,
            message,
            runtime: _,
        } = options;

        if message.to.is_empty() {
            return Err(ConfigurationError::MissingRecipient);
        }

        let from = non_blank(message.from).unwrap_or_else(default_sender);
        let subject = non_blank(message.subject)
            .map(SubjectTemplate::new)
            .unwrap_or_else(|| SubjectTemplate::new(DEFAULT_SUBJECT));
        let filter = message
            .filter
            .unwrap_or_else(|| Arc::new(AcceptAll) as Arc<dyn RecordFilter>);
        let backend = backend.unwrap_or_default();

        debug!(
            to = ?message.to.as_slice(),
            from = %from,
            subject = %subject,
            backend = backend.kind(),
            "Mailer configuration validated"
        );

        Ok(Self {
            to: message.to,
            from,
            subject,
            filter,
            backend,
        })
    }

    pub fn to(&self) -> &[String] {
        self.to.as_slice()
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn subject(&self) -> &SubjectTemplate {
        &self.subject
    }

    pub fn filter(&self) -> &dyn RecordFilter {
        self.filter.as_ref()
    }

    pub fn backend(&self) -> &BackendOptions {
        &self.backend
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("subject", &self.subject)
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `log-mailer@<hostname>`
pub fn default_sender() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{DEFAULT_SENDER_NAME}@{host}")
}
