//! # Trivia Server Library
//!
//! Server side of a real-time multiplayer trivia session. A fixed-size cohort
//! of participants joins over TCP, then the server asks a sequence of timed
//! questions, collects answers against a shared deadline, scores them and
//! announces standings. A server process runs exactly one session.
//!
//! ## Architecture
//!
//! ### Connection Workers
//! Every accepted connection gets its own reader and writer task. The reader
//! performs the join handshake and afterwards forwards whatever the peer sends
//! to the orchestrator as a [`connection::ConnectionEvent`]. The writer drains
//! a per-connection queue, so a slow peer only ever delays itself.
//!
//! ### Single Orchestrator
//! One task drives the rounds strictly in order. It owns the event receiver
//! and is the only consumer of answers; there is never more than one answer
//! collection pass in flight.
//!
//! ### Shared State
//! The [`registry::Registry`] is the only shared mutable state. Its guard is
//! never held across socket I/O.
//!
//! ## Module Organization
//!
//! - `admission`: accept loop, join handshake dispatch and the liveness
//!   re-check that gates the session start
//! - `config`: JSON configuration file and timing knobs
//! - `connection`: per-connection reader and writer tasks
//! - `error`: error taxonomy
//! - `network`: the [`network::Server`] entry point
//! - `ranking`: tie-aware competition ranking
//! - `registry`: participant roster and session phase
//! - `session`: the round loop
//! - `template`: placeholder substitution for configured texts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use trivia_server::config::ServerConfig;
//! use trivia_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::load("config.json")?;
//!     let server = Server::bind("0.0.0.0", config).await?;
//!
//!     // Blocks until the cohort has joined and every round is played
//!     let standings = server.run().await?;
//!     for standing in standings {
//!         println!("{}. {} ({})", standing.rank, standing.username, standing.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod connection;
pub mod error;
pub mod network;
pub mod ranking;
pub mod registry;
pub mod session;
pub mod template;
