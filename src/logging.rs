use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

use crate::{BenchError, Result};

/// Sets up the logging subscriber for the run.
///
/// `RUST_LOG` overrides the default `scaleout_bench=info` filter. When `json`
/// is set, events are emitted as one JSON object per line instead of the
/// compact human format.
///
/// # Arguments
/// * `run_id` - Identifier of this run, attached to the returned span
/// * `case` - Name of the bench case being run
pub fn init_logger(run_id: Uuid, case: &str, json: bool) -> Result<tracing::Span> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scaleout_bench={}", Level::INFO)));

    let fmt_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(false)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| BenchError::Logging(format!("Failed to initialize logger: {}", e)))?;

    Ok(tracing::info_span!(
        "bench",
        run_id = %run_id,
        case = case,
        version = env!("CARGO_PKG_VERSION"),
    ))
}
