//! Hearth license command
//!
//! Usage:
//!   hearth-license ABC-123            verify a key and store the signed result
//!   hearth-license --show             print the stored record
//!   hearth-license --serve 0.0.0.0:8080
//!
//! Exit codes: 0 ok, 1 network, 2 HTTP status, 3 malformed response,
//! 4 missing key or PEM fetch, 5 bad authority key, 6 bad signature,
//! 7 could not save. With `--show`: 1 no file, 2 corrupt wrapper,
//! 3 decryption failed.

use clap::Parser;
use hearth_host::cli::{load_config, run, Args};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(1);
        }
    };
    ExitCode::from(run(&args, config).await)
}
