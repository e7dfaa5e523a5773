//! Logging setup utilities for the pwchat binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Library crates whose log output follows the binary's default level.
const WORKSPACE_CRATES: [&str; 3] = ["pwchat_shared", "pwchat_client", "pwchat_server"];

/// Build the default filter directive used when `RUST_LOG` is not set.
fn default_directive(binary_name: &str, default_log_level: &str) -> String {
    let mut targets: Vec<String> = WORKSPACE_CRATES.iter().map(|c| c.to_string()).collect();
    let binary_target = binary_name.replace('-', "_");
    if !targets.contains(&binary_target) {
        targets.push(binary_target);
    }

    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
/// Output goes to stderr so it does not interleave with the client's chat
/// transcript on stdout.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "pwchat-server", "pwchat-client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use pwchat_shared::logger::setup_logger;
///
/// setup_logger("pwchat-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_directive(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
