//! Logging sink that forwards selected log records as email.
//!
//! A [`MailSink`] takes [`Record`]s from a logging framework, decides with a
//! [`RecordFilter`] whether each one deserves an email, renders the subject
//! from a `{{ level }}` / `{{ message }}` template and hands the message to
//! a pluggable [`MailBackend`]. Outcomes come back as [`SinkEvent`]s.
//!
//! ## Components
//!
//! - **Configuration**: `MailerOptions` validated into a read-only `MailerConfig`
//! - **Records**: `Record` with an explicit upstream-formatted display text
//! - **Dispatch**: `MailSink::log` / `MailSink::deliver`, events via `MailSink::subscribe`
//! - **Backends**: JSON echo (default, no network), SMTP via lettre, Mock
//! - **tracing**: `MailLayer` mails `tracing` events through a sink
//!
//! ## Usage
//!
//! ```ignore
//! use log_mailer::{MailSink, MailerOptions, MessageOptions, Record, SinkEvent};
//!
//! let sink = MailSink::new(MailerOptions::new(
//!     MessageOptions::new("ops@example.com").subject("[{{ level }}] {{ message }}"),
//! ))?;
//! let mut events = sink.subscribe();
//!
//! sink.log(Record::new("error", "disk full"), || {});
//! if let Some(SinkEvent::Logged(info)) = events.recv().await {
//!     println!("sent {}", info.message_id);
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod layer;
pub mod message;
pub mod record;
pub mod sink;
pub mod template;

// Re-export main types
pub use backend::{
    create_backend, BackendFactory, BackendOptions, DeliveryInfo, JsonBackend, MailBackend,
    MockBackend, SmtpBackend, SmtpConfig,
};
pub use config::{MailerConfig, MailerOptions, MessageOptions, Recipients};
pub use error::{ConfigResult, ConfigurationError, DispatchError};
pub use filter::{AcceptAll, LevelFilter, RecordFilter};
pub use layer::MailLayer;
pub use message::{Envelope, OutgoingMessage};
pub use record::Record;
pub use sink::{Delivery, MailSink, SinkEvent};
pub use template::SubjectTemplate;
