//! memrpc Agent Binary
//!
//! Serves simulated process memory over the memrpc protocol.

use anyhow::{Context, Result};
use clap::Parser;
use memrpc_agent::{Agent, SimulatedMemory};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Reference memrpc server backed by simulated process memory
#[derive(Parser, Debug)]
#[command(name = "memrpc-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(default_value = "127.0.0.1:27042")]
    bind: String,

    /// JSON file of process fixtures; a single demo process is served without one
    fixture: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let memory = match &args.fixture {
        Some(fixture) => {
            info!("Loading fixture {}", fixture.display());
            SimulatedMemory::from_json_file(fixture).await?
        }
        None => SimulatedMemory::demo(),
    };

    info!("Starting memrpc agent on {}", args.bind);
    let mut agent = Agent::bind(args.bind.as_str(), Arc::new(memory)).await?;

    let shutdown = agent
        .shutdown_sender()
        .context("Shutdown sender already taken")?;
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    if let Err(e) = agent.run().await {
        error!("Agent error: {}", e);
        std::process::exit(1);
    }

    info!("Agent shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["memrpc-agent"]).unwrap();
        assert_eq!(args.bind, format!("127.0.0.1:{}", memrpc_proto::DEFAULT_PORT));
        assert!(args.fixture.is_none());
    }

    #[test]
    fn test_args_positional() {
        let args = Args::try_parse_from(["memrpc-agent", "0.0.0.0:9000", "procs.json"]).unwrap();
        assert_eq!(args.bind, "0.0.0.0:9000");
        assert_eq!(args.fixture, Some(PathBuf::from("procs.json")));
    }

    #[test]
    fn test_args_help_is_not_a_bind_address() {
        let err = Args::try_parse_from(["memrpc-agent", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_args_reject_extra_arguments() {
        let err = Args::try_parse_from(["memrpc-agent", "a:1", "f.json", "extra"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }
}
