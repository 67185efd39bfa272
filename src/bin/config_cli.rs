//! `blockchain-exporter-config` — validates and pretty-prints a config file
//! without starting the exporter process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use blockchain_exporter::config::load_blockchain_configs;
use blockchain_exporter::runtime_settings::RuntimeSettings;

#[derive(Parser)]
#[command(name = "blockchain-exporter-config")]
#[command(about = "Validate and inspect blockchain exporter configuration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a config file, printing errors if any.
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the fully resolved runtime settings as JSON.
    Print {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Include raw RPC URLs instead of masking them.
        #[arg(long)]
        show_secrets: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Validate { config } => run_validate(config),
        Command::Print { config, show_secrets } => run_print(config, show_secrets),
    };

    std::process::exit(exit_code);
}

fn run_validate(config: Option<PathBuf>) -> i32 {
    let path = config.unwrap_or_else(|| PathBuf::from("config.toml"));
    match load_blockchain_configs(&path) {
        Ok(blockchains) => {
            println!("configuration is valid: {} blockchain(s) configured", blockchains.len());
            0
        }
        Err(err) => {
            eprintln!("configuration error: {err}");
            1
        }
    }
}

fn run_print(config: Option<PathBuf>, show_secrets: bool) -> i32 {
    let runtime = match RuntimeSettings::load(config.as_deref()) {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return 1;
        }
    };

    let blockchains: Vec<_> = runtime
        .blockchains
        .iter()
        .map(|b| {
            serde_json::json!({
                "name": b.name,
                "rpc_url": if show_secrets { b.rpc_url.clone() } else { "<masked>".to_string() },
                "poll_interval": b.poll_interval,
                "contracts": b.contracts.len(),
                "accounts": b.accounts.len(),
            })
        })
        .collect();

    let payload = serde_json::json!({
        "config_path": runtime.config_path.display().to_string(),
        "health_port": runtime.app.server.health_port,
        "metrics_port": runtime.app.server.metrics_port,
        "blockchains": blockchains,
    });

    match serde_json::to_string_pretty(&payload) {
        Ok(rendered) => {
            println!("{rendered}");
            0
        }
        Err(err) => {
            eprintln!("failed to render settings: {err}");
            1
        }
    }
}
