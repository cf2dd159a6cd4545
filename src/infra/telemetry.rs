use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_COALESCED_TOTAL, METRIC_FETCH_MS, METRIC_MEMORY_HIT_TOTAL, METRIC_MISS_TOTAL,
    METRIC_STORE_ERROR_TOTAL, METRIC_STORE_HIT_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_MEMORY_HIT_TOTAL,
            Unit::Count,
            "Lookups served from the in-process memory tier."
        );
        describe_counter!(
            METRIC_STORE_HIT_TOTAL,
            Unit::Count,
            "Lookups served from the durable key-value tier."
        );
        describe_counter!(
            METRIC_COALESCED_TOTAL,
            Unit::Count,
            "Lookups that joined a computation already in flight."
        );
        describe_counter!(
            METRIC_MISS_TOTAL,
            Unit::Count,
            "Lookups that started a new upstream computation."
        );
        describe_counter!(
            METRIC_STORE_ERROR_TOTAL,
            Unit::Count,
            "Durable tier operations that failed and were treated as misses."
        );
        describe_histogram!(
            METRIC_FETCH_MS,
            Unit::Milliseconds,
            "Latency of cached computations in milliseconds."
        );
    });
}
