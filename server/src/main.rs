use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use trivia_server::config::ServerConfig;
use trivia_server::network::Server;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs one multiplayer trivia session", long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: PathBuf,

    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Overrides the port from the configuration file
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match ServerConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("trivia-server: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    info!(
        "Starting trivia server: {} players, {} questions, {}s per question",
        config.players,
        config.question_types.len(),
        config.question_seconds
    );

    let server = match Server::bind(&args.host, config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("trivia-server: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Session failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    ExitCode::SUCCESS
}
