//! plugin-mirror binary: mirror the configured catalog into the working directory.
//!
//! Takes no flags. Set `PLUGIN_MIRROR_CONFIG` to a JSON config file to override
//! the defaults and `RUST_LOG` to change log verbosity.

use plugin_mirror::progress::ConsoleReporter;
use plugin_mirror::{Config, Mirror};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable naming an optional JSON config file
const CONFIG_ENV: &str = "PLUGIN_MIRROR_CONFIG";

fn load_config() -> plugin_mirror::Result<Config> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => Config::from_file(&PathBuf::from(path)),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("plugin_mirror=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mirror = match load_config().and_then(Mirror::new) {
        Ok(mirror) => mirror,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let config = mirror.config();
    tracing::info!(
        endpoint = %config.catalog.endpoint,
        target_count = config.catalog.target_count,
        base_dir = ?config.storage.base_dir,
        max_concurrent = config.download.max_concurrent,
        "starting mirror run"
    );

    let reporter = std::io::stderr()
        .is_terminal()
        .then(|| ConsoleReporter::spawn(mirror.subscribe()));

    let result = mirror.run().await;

    // Dropping the last progress sink lets the reporter finish its final line
    drop(mirror);
    if let Some(reporter) = reporter {
        reporter.await.ok();
    }

    match result {
        Ok(report) => {
            tracing::info!(
                total = report.total,
                succeeded = report.succeeded,
                skipped = report.skipped,
                failed = report.failed.len(),
                "mirror run complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "mirror run failed");
            ExitCode::FAILURE
        }
    }
}
