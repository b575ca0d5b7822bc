//! cftun binary
//!
//! Usage: cftun [OPTIONS]
//!
//! Runs as the local SOCKS5 agent when both a local and a server address
//! are given, and as the server agent when only a server address is given.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

use cftun::agent::{Agent, AgentConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing, respects RUST_LOG (e.g. RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    run_agent(config).await
}

fn print_usage() {
    println!(
        r#"cftun - encrypted SOCKS5 tunnel

USAGE:
    cftun [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Configuration file (JSON, or TOML with a .toml extension)
    -l, --local <ADDR>      SOCKS5 listen address (local role)
    -s, --server <ADDR>     Server agent address
    -m, --method <NAME>     Cipher: aes-128-cfb, aes-192-cfb or aes-256-cfb [default: aes-256-cfb]
    -p, --password <PASS>   Shared password
    -t, --timeout <SECS>    Relay idle timeout in seconds [default: 120]
    -h, --help              Print help information

Flags override values read from the configuration file.

EXAMPLES:
    Run the server agent:
        cftun -s 0.0.0.0:8388 -p secret

    Run the local agent:
        cftun -l 127.0.0.1:1080 -s 203.0.113.7:8388 -p secret
"#
    );
}

/// Build the configuration from an optional file plus command-line overrides.
fn parse_args(args: &[String]) -> anyhow::Result<AgentConfig> {
    let mut config_path = None;
    let mut overrides = Vec::new();

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let value = iter
            .next()
            .with_context(|| format!("{} requires a value", flag))?;
        match flag.as_str() {
            "-c" | "--config" => config_path = Some(value.clone()),
            "-l" | "--local" | "-s" | "--server" | "-m" | "--method" | "-p" | "--password"
            | "-t" | "--timeout" => overrides.push((flag.as_str(), value.clone())),
            _ => bail!("unknown option: {}", flag),
        }
    }

    let mut config = match config_path {
        Some(path) => AgentConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => AgentConfig::default(),
    };

    for (flag, value) in overrides {
        match flag {
            "-l" | "--local" => config.local_addr = Some(value),
            "-s" | "--server" => config.server_addr = Some(value),
            "-m" | "--method" => config.method = value,
            "-p" | "--password" => config.password = value,
            _ => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("invalid timeout: {}", value))?;
                config.timeout = Duration::from_secs(secs);
            }
        }
    }

    config.validate()?;
    Ok(config)
}

async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    let agent = Agent::new(config)?;
    let metrics = agent.metrics();

    tokio::select! {
        result = agent.run() => result?,
        _ = shutdown_signal() => tracing::info!("Shutting down"),
    }

    tracing::info!("{}", metrics.summary());
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
