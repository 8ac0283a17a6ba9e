//! # Trivia Client Library
//!
//! Participant side of the trivia protocol. The client reads commands from
//! stdin, joins a server with `HI`, prints what the server sends and answers
//! questions either from typed input or with the shared solver.
//!
//! ## Module Organization
//!
//! - `config`: client configuration file (username and answering mode)
//! - `game`: pure state machine turning server messages into output and
//!   answers, including the per-question answer deadline
//! - `input`: stdin command parsing (`CONNECT host:port`, `DISCONNECT`,
//!   `EXIT`)
//! - `network`: the [`network::Client`] event loop multiplexing stdin, the
//!   server connection and the answer deadline
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tokio::io::{stdin, stdout, BufReader};
//! use trivia_client::config::ClientConfig;
//! use trivia_client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load("client.json")?;
//!     let mut client = Client::new(config, stdout());
//!     client.run(BufReader::new(stdin())).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
