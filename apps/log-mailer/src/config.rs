//! Configuration for the log-mailer binary, loaded from the environment

use log_mailer::{BackendOptions, LevelFilter, MailerOptions, MessageOptions, SmtpConfig};
use std::env;
use std::sync::Arc;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment; decides the log output format
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env_or_default("APP_ENV", "development");

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Which mail backend to use
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Echo messages as JSON, no network
    Json,
    Smtp,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "smtp" => Ok(Self::Smtp),
            other => Err(format!("unknown backend '{other}', expected 'json' or 'smtp'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    /// Comma-separated recipients
    pub to: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    /// Only mail records at these levels; empty mails everything
    pub levels: Vec<String>,
    pub backend: BackendKind,
    /// Present when `backend` is `Smtp`
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let backend = env_or_default("LOG_MAILER_BACKEND", "json")
            .parse::<BackendKind>()
            .map_err(|details| ConfigError::ParseError {
                key: "LOG_MAILER_BACKEND".to_string(),
                details,
            })?;

        let smtp = match backend {
            BackendKind::Smtp => Some(SmtpConfig::from_env()?),
            BackendKind::Json => None,
        };

        Ok(Self {
            environment: Environment::from_env(),
            to: env_required("LOG_MAILER_TO")?,
            from: env_optional("LOG_MAILER_FROM"),
            subject: env_optional("LOG_MAILER_SUBJECT"),
            levels: env_optional("LOG_MAILER_LEVELS")
                .map(|levels| {
                    levels
                        .split(',')
                        .map(str::trim)
                        .filter(|level| !level.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            backend,
            smtp,
        })
    }

    /// Options for the mail sink; validation happens in `MailSink::new`
    pub fn mailer_options(&self) -> MailerOptions {
        let mut message = MessageOptions::new(self.to.as_str());
        message.from = self.from.clone();
        message.subject = self.subject.clone();
        if !self.levels.is_empty() {
            message = message.with_filter(Arc::new(LevelFilter::new(self.levels.clone())));
        }

        let options = MailerOptions::new(message);
        match &self.smtp {
            Some(smtp) => options.backend(BackendOptions::Smtp(smtp.clone())),
            None => options.backend(BackendOptions::Json),
        }
    }
}

/// Load an environment variable, falling back to `default`
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load an environment variable or fail with `MissingEnvVar`
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Load an environment variable, treating empty values as unset
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_mailer::{Record, RecordFilter};

    const VARS: [&str; 6] = [
        "APP_ENV",
        "LOG_MAILER_TO",
        "LOG_MAILER_FROM",
        "LOG_MAILER_SUBJECT",
        "LOG_MAILER_LEVELS",
        "LOG_MAILER_BACKEND",
    ];

    #[test]
    fn test_environment_defaults_to_development() {
        temp_env::with_var_unset("APP_ENV", || {
            let env = Environment::from_env();
            assert_eq!(env, Environment::Development);
            assert!(!env.is_production());
        });
    }

    #[test]
    fn test_environment_production_case_insensitive() {
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert!(Environment::from_env().is_production());
        });
    }

    #[test]
    fn test_config_requires_recipient() {
        temp_env::with_vars_unset(VARS, || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("LOG_MAILER_TO"));
        });
    }

    #[test]
    fn test_config_defaults_to_json_backend() {
        temp_env::with_vars(
            [
                ("LOG_MAILER_TO", Some("ops@example.com, oncall@example.com")),
                ("LOG_MAILER_FROM", None),
                ("LOG_MAILER_SUBJECT", Some("[{{ level }}] {{ message }}")),
                ("LOG_MAILER_LEVELS", None),
                ("LOG_MAILER_BACKEND", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.backend, BackendKind::Json);
                assert!(config.smtp.is_none());
                assert!(config.from.is_none());
                assert!(config.levels.is_empty());

                let options = config.mailer_options();
                assert_eq!(options.message.to.len(), 2);
                assert_eq!(
                    options.message.subject.as_deref(),
                    Some("[{{ level }}] {{ message }}")
                );
                assert_eq!(options.backend.map(|b| b.kind()), Some("json"));
            },
        );
    }

    #[test]
    fn test_config_smtp_backend() {
        temp_env::with_vars(
            [
                ("LOG_MAILER_TO", Some("ops@example.com")),
                ("LOG_MAILER_BACKEND", Some("SMTP")),
                ("SMTP_HOST", Some("mail.example.com")),
                ("SMTP_PORT", Some("2525")),
                ("SMTP_USE_TLS", Some("false")),
                ("SMTP_TIMEOUT_SECS", Some("15")),
            ],
            || {
                let config = Config::from_env().unwrap();
                let smtp = config.smtp.clone().unwrap();
                assert_eq!(smtp.host, "mail.example.com");
                assert_eq!(smtp.port, 2525);
                assert!(!smtp.use_tls);
                assert_eq!(smtp.timeout, Some(std::time::Duration::from_secs(15)));
                assert_eq!(config.mailer_options().backend.map(|b| b.kind()), Some("smtp"));
            },
        );
    }

    #[test]
    fn test_config_unknown_backend() {
        temp_env::with_vars(
            [
                ("LOG_MAILER_TO", Some("ops@example.com")),
                ("LOG_MAILER_BACKEND", Some("carrier-pigeon")),
            ],
            || {
                let err = Config::from_env().unwrap_err();
                assert!(err.to_string().contains("LOG_MAILER_BACKEND"));
            },
        );
    }

    #[test]
    fn test_config_levels_restrict_mailed_records() {
        temp_env::with_vars(
            [
                ("LOG_MAILER_TO", Some("ops@example.com")),
                ("LOG_MAILER_LEVELS", Some("error, Warn,,")),
                ("LOG_MAILER_BACKEND", None),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.levels, ["error", "Warn"]);

                let filter = config.mailer_options().message.filter.unwrap();
                assert!(filter.accept(&Record::new("ERROR", "disk full")).unwrap());
                assert!(filter.accept(&Record::new("warn", "disk low")).unwrap());
                assert!(!filter.accept(&Record::new("info", "disk ok")).unwrap());
            },
        );
    }

    #[test]
    fn test_env_required_rejects_blank() {
        temp_env::with_var("BLANK_REQUIRED", Some("  "), || {
            let err = env_required("BLANK_REQUIRED").unwrap_err();
            assert!(err.to_string().contains("BLANK_REQUIRED"));
        });
    }
}
