//! Server entry point tying admission and the session together

use crate::admission::AdmissionController;
use crate::config::{ServerConfig, SessionTiming};
use crate::error::ServerError;
use crate::ranking::Standing;
use crate::registry::{Registry, SessionPhase};
use crate::session::Session;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use trivia_shared::{Grader, QuestionGenerator, RandomQuestions, StandardGrader};

/// A bound trivia server that runs exactly one session
///
/// The question generator and grader default to the shared implementations
/// and can be swapped before [`Server::run`], which tests use to fix the
/// questions asked.
pub struct Server<G = RandomQuestions, A = StandardGrader> {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    timing: SessionTiming,
    registry: Registry,
    generator: G,
    grader: A,
}

impl Server {
    /// Binds `host` on the configured port
    ///
    /// The config is validated again here since its fields are public and
    /// may have been changed after loading.
    pub async fn bind(host: &str, config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = format!("{}:{}", host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::BindFailure {
                addr: addr.clone(),
                source,
            })?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            config: Arc::new(config),
            timing: SessionTiming::default(),
            registry: Registry::new(),
            generator: RandomQuestions::new(),
            grader: StandardGrader,
        })
    }
}

impl<G, A> Server<G, A>
where
    G: QuestionGenerator,
    A: Grader,
{
    pub fn with_questions<Q: QuestionGenerator>(self, generator: Q) -> Server<Q, A> {
        Server {
            listener: self.listener,
            config: self.config,
            timing: self.timing,
            registry: self.registry,
            generator,
            grader: self.grader,
        }
    }

    pub fn with_grader<B: Grader>(self, grader: B) -> Server<G, B> {
        Server {
            listener: self.listener,
            config: self.config,
            timing: self.timing,
            registry: self.registry,
            generator: self.generator,
            grader,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the live roster, mainly for observing a running session
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.registry.phase().await
    }

    /// Fills the cohort, plays every round and returns the final standings.
    ///
    /// The listener is closed as soon as admission ends, so connection
    /// attempts during the session are refused by the OS.
    pub async fn run(self) -> Result<Vec<Standing>, ServerError> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        AdmissionController::new(
            &self.listener,
            self.registry.clone(),
            self.timing.clone(),
            self.config.players,
            events_tx,
        )
        .fill_cohort(&mut events_rx)
        .await;
        drop(self.listener);

        let standings = Session::new(
            self.config,
            self.timing,
            self.registry,
            events_rx,
            self.generator,
            self.grader,
        )
        .run()
        .await;

        info!("Server finished");
        Ok(standings)
    }
}
