use crate::config::Environment;
use log_mailer::MailLayer;
use tracing::debug;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Install color-eyre for error reports.
///
/// Safe to call multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing.
///
/// - **Production** (`APP_ENV=production`): JSON lines, no module targets
/// - **Development** (default): pretty output
///
/// `RUST_LOG` overrides the default `info` filter. When `mail_layer` is
/// given, events it selects are also mailed. Subsequent calls are no-ops.
pub fn init_tracing(environment: &Environment, mail_layer: Option<MailLayer>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if environment.is_production() {
        tracing_subscriber::registry()
            .with(mail_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(mail_layer)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    if result.is_err() {
        debug!("Tracing already initialized, skipping re-initialization");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_multiple_calls() {
        // Should not panic when called multiple times
        init_tracing(&Environment::Development, None);
        init_tracing(&Environment::Production, None);
    }
}
