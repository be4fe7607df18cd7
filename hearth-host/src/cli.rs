//! The `hearth-license` command: verify a key with the authority, show the
//! stored record, or serve the management API.

use crate::{build_router, protect};
use anyhow::{Context, Result};
use clap::Parser;
use hearth_license::{boot, LicenseClientConfig, LicenseError, LicenseManager, LicenseVerifier};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hearth-license")]
#[command(about = "Verify, inspect or serve the installed Hearth license")]
pub struct Args {
    /// License key to verify with the authority
    pub license_key: Option<String>,

    /// Passphrase for the encrypted store (defaults to APP_LICENSE_PASSPHRASE / APP_KEY)
    #[arg(long)]
    pub passphrase: Option<String>,

    /// Decrypt and print the stored license without contacting the authority
    #[arg(long)]
    pub show: bool,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Resolve identity and serve the management API on this address
    #[arg(long, value_name = "ADDR", conflicts_with_all = ["show", "license_key"])]
    pub serve: Option<SocketAddr>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Exit code for a failed verification.
#[must_use]
pub fn verify_exit_code(err: &LicenseError) -> u8 {
    match err {
        LicenseError::Network(_) => 1,
        LicenseError::AuthorityRejected { .. } => 2,
        LicenseError::MalformedResponse(_) => 3,
        LicenseError::MissingLicenseKey | LicenseError::KeyFetchFailed(_) => 4,
        LicenseError::InvalidAuthorityKey(_) => 5,
        LicenseError::SignatureInvalid => 6,
        _ => 7,
    }
}

/// Exit code for a failed `--show`.
#[must_use]
pub fn show_exit_code(err: &LicenseError) -> u8 {
    match err {
        LicenseError::NotInstalled | LicenseError::Io(_) => 1,
        LicenseError::CorruptStore(_) => 2,
        _ => 3,
    }
}

/// Configuration file (if any) plus environment overrides.
pub fn load_config(path: Option<&PathBuf>) -> Result<LicenseClientConfig> {
    let config = match path {
        Some(path) => LicenseClientConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => LicenseClientConfig::default(),
    };
    Ok(config.with_env_overrides())
}

/// Runs one invocation against `config` and returns the process exit code.
pub async fn run(args: &Args, config: LicenseClientConfig) -> u8 {
    if let Some(addr) = args.serve {
        return match serve(addr, config).await {
            Ok(()) => 0,
            Err(e) => {
                error!("{e:#}");
                1
            }
        };
    }

    let verifier = match LicenseVerifier::from_config(&config) {
        Ok(verifier) => verifier,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };
    let passphrase = args.passphrase.as_deref();

    if args.show {
        return match verifier.show(passphrase) {
            Ok(plaintext) => {
                let pretty = serde_json::from_str::<serde_json::Value>(&plaintext)
                    .and_then(|v| serde_json::to_string_pretty(&v))
                    .unwrap_or(plaintext);
                println!("{pretty}");
                0
            }
            Err(e) => {
                eprintln!("Error: {e}");
                show_exit_code(&e)
            }
        };
    }

    let license_key = args.license_key.as_deref().unwrap_or_default();
    let domain = config.license_domain();
    match verifier.verify_and_store(license_key, &domain, passphrase).await {
        Ok(verification) => {
            let status = verification.status();
            println!("License verified and saved to {}", verifier.store().path().display());
            println!("  Domain:      {domain}");
            println!("  Valid:       {}", status.is_valid);
            if let Some(until) = status.valid_until {
                println!("  Valid until: {}", until.to_rfc3339());
            }
            if verification.awaiting_approval() {
                println!("  The authority registered this key; it awaits approval.");
            }
            if !verification.message().is_empty() {
                println!("  Message:     {}", verification.message());
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {e}");
            verify_exit_code(&e)
        }
    }
}

async fn serve(addr: SocketAddr, config: LicenseClientConfig) -> Result<()> {
    let outcome = boot(&config).await.context("License boot failed")?;
    let manager = Arc::new(LicenseManager::from_config(&config)?);
    let app = protect(build_router(manager), &outcome);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "Management API listening on {addr} ({})",
        if outcome.gate().is_some() { "enforcing" } else { "authority" }
    );
    axum::serve(listener, app).await.context("HTTP server failed")
}
