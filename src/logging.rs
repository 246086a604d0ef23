//! Structured logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::domain::error::FxError;

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Log lines go to stderr; stdout carries the metrics table.
pub fn init_logging(level: &str) -> Result<(), FxError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| FxError::Logging {
            reason: e.to_string(),
        })?;

    Ok(())
}
