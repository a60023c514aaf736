// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The vault-autocert Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vault PKI auto-certificate command-line tool
//!
//! # Usage
//!
//! ```text
//! vault-autocert [OPTIONS] <COMMAND>
//!
//! Commands:
//!   serve         Serve HTTPS with a self-renewing certificate
//!   issue         Issue one certificate and print a summary
//!   check-config  Load and validate the settings file
//!
//! Options:
//!   -c, --config <PATH>   Path to settings file
//!   -v, --verbose         Enable debug output
//!   -q, --quiet           Only log errors
//!   -h, --help            Print help
//!   -V, --version         Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Terminate TLS on :8443 with a certificate renewed from Vault
//! VAULT_TOKEN=s.xxx vault-autocert --config ./vault-autocert.toml serve --listen 0.0.0.0:8443
//!
//! # One-off issuance against the configured role
//! vault-autocert issue --format json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vault_autocert::logging::{init_logging, LogLevel};
use vault_autocert::settings::{Settings, SettingsLoader};
use vault_autocert::{CertProvider, CertificateRecord, CertResolver, VaultPkiClient};

/// Vault PKI auto-certificate tool
#[derive(Parser)]
#[command(name = "vault-autocert")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Self-renewing TLS certificates from Vault PKI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to settings file
    #[arg(short, long, global = true, value_name = "PATH", env = "VAULT_AUTOCERT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve HTTPS with a self-renewing certificate until interrupted
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8443")]
        listen: SocketAddr,
    },

    /// Issue one certificate and print a summary
    Issue {
        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Load and validate the settings file
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = match settings.log_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if cli.verbose {
        log_config = log_config.with_level(LogLevel::Debug);
    } else if cli.quiet {
        log_config = log_config.with_level(LogLevel::Error);
    }
    if let Err(e) = init_logging(&log_config) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli.command, settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(cli: &Cli) -> vault_autocert::Result<Settings> {
    let mut loader = SettingsLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    loader.load()
}

async fn run_command(command: Commands, settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve { listen } => cmd_serve(&settings, listen).await,
        Commands::Issue { format } => cmd_issue(&settings, format).await,
        Commands::CheckConfig => cmd_check_config(&settings),
    }
}

async fn cmd_serve(settings: &Settings, listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.to_vault_config()?;
    let cancel = CancellationToken::new();

    let provider = CertProvider::new(&config, cancel.clone()).await?;
    let resolver = provider.resolver();
    let acceptor = TlsAcceptor::from(provider.server_config()?);

    let listener = TcpListener::bind(listen).await?;
    info!(address = %listen, "Listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let acceptor = acceptor.clone();
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(acceptor, stream, &resolver).await {
                        debug!(peer = %peer, error = %e, "Connection closed with error");
                    }
                });
            }
        }
    }

    cancel.cancel();
    provider.shutdown().await;
    Ok(())
}

async fn handle_connection(
    acceptor: TlsAcceptor,
    stream: tokio::net::TcpStream,
    resolver: &CertResolver,
) -> std::io::Result<()> {
    let mut tls = acceptor.accept(stream).await?;

    let mut buf = [0u8; 4096];
    let _ = tls.read(&mut buf).await?;

    let body = match resolver.get_certificate() {
        Ok(record) => format!("serial {}\n", record.serial_number()),
        Err(e) => format!("{}\n", e),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    tls.write_all(response.as_bytes()).await?;
    tls.shutdown().await
}

async fn cmd_issue(settings: &Settings, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.to_vault_config()?;
    let client = VaultPkiClient::new(&config)?;
    let issued = client.issue_certificate().await?;

    print_record(&issued.record, format)?;
    Ok(())
}

fn print_record(record: &CertificateRecord, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let not_after = record.not_after().duration_since(UNIX_EPOCH)?.as_secs();

    match format {
        OutputFormat::Text => {
            println!("Serial:      {}", record.serial_number());
            println!("Not after:   {} (unix)", not_after);
            println!("Lease:       {}s", record.lease().as_secs());
            println!("Chain:       {} certificate(s)", record.chain().len());
        }
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "serial_number": record.serial_number(),
                "not_after": not_after,
                "lease_seconds": record.lease().as_secs(),
                "chain_length": record.chain().len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

fn cmd_check_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config = settings.to_vault_config()?;

    println!("Configuration OK");
    println!("  Endpoint:     {}", config.issue_url());
    println!("  Common name:  {}", config.common_name);
    if !config.alt_names.is_empty() {
        println!("  Alt names:    {}", config.alt_names.join(", "));
    }
    if !config.ip_sans.is_empty() {
        let ips: Vec<String> = config.ip_sans.iter().map(|ip| ip.to_string()).collect();
        println!("  IP SANs:      {}", ips.join(", "));
    }
    println!("  Renew after:  {:.0}% of lease", config.renewal.renew_modifier * 100.0);
    println!("  Retry delay:  {}s", config.renewal.retry_delay.as_secs());
    println!("  On exhausted: {}", config.renewal.on_exhausted.as_str());
    Ok(())
}
