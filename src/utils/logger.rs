use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "wallet_checkout=info";
const VERBOSE_FILTER: &str = "wallet_checkout=debug,info";

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Human-readable output for interactive runs. `RUST_LOG` wins over
/// `verbose` when set.
pub fn init_cli_logger(verbose: bool) {
    let filter = if verbose {
        env_filter(VERBOSE_FILTER)
    } else {
        env_filter(DEFAULT_FILTER)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// One JSON object per line, for hosts that ship logs to a collector.
pub fn init_json_logger(level: Option<&str>) {
    let filter = match level {
        Some(level) => env_filter(&format!("wallet_checkout={level}")),
        None => env_filter(DEFAULT_FILTER),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}
