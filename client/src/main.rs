use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{stdin, stdout, BufReader};
use trivia_client::config::ClientConfig;
use trivia_client::network::Client;

#[derive(Parser, Debug)]
#[command(author, version, about = "Joins a multiplayer trivia session", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = match ClientConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("trivia-client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Starting client as {} ({:?} mode)", config.username, config.client_mode);
    info!("Commands: CONNECT <host>:<port>, DISCONNECT, EXIT");

    let mut client = Client::new(config, stdout());
    tokio::select! {
        result = client.run(BufReader::new(stdin())) => {
            if let Err(e) = result {
                eprintln!("trivia-client: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, exiting");
        }
    }

    ExitCode::SUCCESS
}
