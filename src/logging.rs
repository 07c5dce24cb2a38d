//! Log setup shared by the annotator binaries.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable that overrides the default filter (e.g. `rsml_annotator=debug`).
pub const LOG_ENV_VAR: &str = "ANNOTATOR_LOG";

/// Initialize structured JSON logging for the server.
///
/// Defaults to `info` so request spans and account transitions are visible.
pub fn init() {
    init_with_default(LevelFilter::INFO);
}

/// Initialize structured JSON logging with a caller-chosen default level.
///
/// The CLI passes `WARN` so its stdout stays clean for JSON output; `ANNOTATOR_LOG` still wins
/// when set. Safe to call more than once; later calls are ignored.
pub fn init_with_default(default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}
