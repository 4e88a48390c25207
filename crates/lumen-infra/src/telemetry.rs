use lumen_core::config::LogFormat;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "lumen=info,lumen_core=info,lumen_storage=info,lumen_processing=info,lumen_worker=info,lumen_services=info";

/// Initialize the global tracing subscriber. Fails if one is already installed.
pub fn init_telemetry(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()?,
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }

    tracing::debug!(format = ?format, "Tracing initialized");
    Ok(())
}
