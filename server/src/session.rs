//! Session orchestrator driving the question/answer/score cycle
//!
//! Rounds run strictly one after another. Each round broadcasts a QUESTION,
//! collects at most one ANSWER per participant until everyone has answered or
//! the deadline passes, grades and scores the answers, sends individual
//! RESULTs and, between rounds, a LEADERBOARD. After the last round the final
//! standings are broadcast and every connection is closed.
//!
//! Connection workers never touch the session directly: they report through
//! the [`ConnectionEvent`] channel consumed here.

use crate::config::{ServerConfig, SessionTiming};
use crate::connection::ConnectionEvent;
use crate::ranking::{rank, winners, Standing};
use crate::registry::{ConnectionId, Registry};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};
use trivia_shared::{Category, Grader, Message, QuestionGenerator};

/// One question/answer/score cycle
#[derive(Debug, Clone)]
pub struct Round {
    /// Zero-based position in the session
    pub index: usize,
    pub category: Category,
    pub short_question: String,
    pub trivia_question: String,
    pub time_limit: Duration,
    pub started_at: Instant,
    /// Fixed when the round starts; never extended by slow participants
    pub deadline: Instant,
}

pub struct Session<G, A> {
    config: Arc<ServerConfig>,
    timing: SessionTiming,
    registry: Registry,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
    generator: G,
    grader: A,
}

impl<G, A> Session<G, A>
where
    G: QuestionGenerator,
    A: Grader,
{
    pub fn new(
        config: Arc<ServerConfig>,
        timing: SessionTiming,
        registry: Registry,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
        generator: G,
        grader: A,
    ) -> Self {
        Self {
            config,
            timing,
            registry,
            events,
            generator,
            grader,
        }
    }

    /// Plays every configured round and returns the final standings
    pub async fn run(mut self) -> Vec<Standing> {
        info!(
            "Session started with {} participants",
            self.registry.len().await
        );

        self.registry
            .broadcast(&Message::Ready {
                info: self.config.ready_info(),
            })
            .await;
        sleep(self.config.question_interval()).await;

        let categories = self.config.question_types.clone();
        for (index, category) in categories.iter().copied().enumerate() {
            self.play_round(index, category).await;

            if index + 1 < categories.len() {
                self.send_leaderboard().await;
                sleep(self.timing.leaderboard_pause(self.config.time_limit())).await;
            }
        }

        self.finish().await
    }

    async fn play_round(&mut self, index: usize, category: Category) {
        // Anything queued since the last round is either a disconnect that
        // still needs handling or an answer that arrived too late.
        self.drain_events().await;

        let round = self.start_round(index, category);
        info!(
            "Round {}: {} {:?}",
            index + 1,
            category,
            round.short_question
        );

        self.registry
            .broadcast(&Message::Question {
                question_type: category,
                trivia_question: round.trivia_question.clone(),
                short_question: round.short_question.clone(),
                time_limit: round.time_limit.as_secs_f64(),
            })
            .await;

        let answers = self.collect_answers(&round).await;
        info!("Round {}: {} answers collected", index + 1, answers.len());

        sleep(self.timing.result_settle).await;
        self.send_results(&round, &answers).await;
        sleep(self.timing.result_settle).await;
    }

    fn start_round(&mut self, index: usize, category: Category) -> Round {
        let short_question = self.generator.generate(category);
        let trivia_question = self
            .config
            .trivia_question(index, category, &short_question);
        let time_limit = self.config.time_limit();
        let started_at = Instant::now();

        Round {
            index,
            category,
            short_question,
            trivia_question,
            time_limit,
            started_at,
            deadline: started_at + time_limit + self.timing.answer_grace,
        }
    }

    /// Waits for answers until every current participant has answered or the
    /// round's deadline passes, whichever comes first.
    ///
    /// The first answer from a participant wins; later ones are ignored.
    /// Each wait is bounded by the poll interval so removals made elsewhere
    /// (for example by a failed broadcast) are noticed promptly.
    pub async fn collect_answers(&mut self, round: &Round) -> HashMap<ConnectionId, String> {
        let mut answers: HashMap<ConnectionId, String> = HashMap::new();

        loop {
            let participants = self.registry.snapshot().await;
            if participants.iter().all(|p| answers.contains_key(&p.id)) {
                debug!("Round {}: every participant answered", round.index + 1);
                break;
            }

            let now = Instant::now();
            if now >= round.deadline {
                break;
            }
            let wait_until = (now + self.timing.poll_interval).min(round.deadline);

            match timeout_at(wait_until, self.events.recv()).await {
                Ok(Some(ConnectionEvent::Message {
                    id,
                    message: Message::Answer { answer },
                })) => {
                    if !self.registry.contains(id).await {
                        continue;
                    }
                    if answers.contains_key(&id) {
                        debug!("Ignoring repeated answer from connection {}", id);
                    } else {
                        answers.insert(id, answer);
                    }
                }
                Ok(Some(event)) => self.handle_event(event).await,
                // Every worker is gone; nothing more can arrive this round.
                Ok(None) => sleep(wait_until.saturating_duration_since(Instant::now())).await,
                Err(_) => {}
            }
        }

        // Answers from participants lost during collection get no result.
        answers
    }

    async fn send_results(&mut self, round: &Round, answers: &HashMap<ConnectionId, String>) {
        for participant in self.registry.snapshot().await {
            let Some(answer) = answers.get(&participant.id) else {
                continue;
            };

            let grade = self
                .grader
                .grade(round.category, &round.short_question, answer);
            if grade.is_correct {
                self.registry.update_score(&participant.username, 1).await;
            }

            let feedback = self
                .config
                .feedback(answer, &grade.correct_answer, grade.is_correct);
            self.registry
                .send_to(
                    participant.id,
                    Message::Result {
                        correct: grade.is_correct,
                        feedback,
                    },
                )
                .await;
        }
    }

    async fn current_standings(&self) -> Vec<Standing> {
        rank(
            self.registry
                .snapshot()
                .await
                .into_iter()
                .map(|p| (p.username, p.score)),
        )
    }

    fn render_standings(&self, standings: &[Standing]) -> String {
        standings
            .iter()
            .map(|standing| standing.line(self.config.points_noun(standing.score)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn send_leaderboard(&mut self) {
        self.drain_events().await;
        let standings = self.current_standings().await;
        let state = self.render_standings(&standings);
        debug!("Leaderboard:\n{}", state);
        self.registry.broadcast(&Message::Leaderboard { state }).await;
    }

    async fn finish(mut self) -> Vec<Standing> {
        self.drain_events().await;
        let standings = self.current_standings().await;

        let mut final_standings = self.config.final_standings_heading.clone();
        if !standings.is_empty() {
            final_standings.push('\n');
            final_standings.push_str(&self.render_standings(&standings));
            final_standings.push('\n');
            final_standings.push_str(&self.config.winner_heading(&winners(&standings)));
        }

        info!("Session finished:\n{}", final_standings);
        self.registry
            .broadcast(&Message::Finished { final_standings })
            .await;
        self.registry.close_all().await;

        standings
    }

    /// Applies every queued event without waiting; queued answers are stale
    async fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                ConnectionEvent::Message {
                    id,
                    message: Message::Answer { .. },
                } => debug!("Discarding answer from connection {} outside a round", id),
                other => self.handle_event(other).await,
            }
        }
    }

    async fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Disconnected { id, cause } => {
                if let Some(participant) = self.registry.remove(id).await {
                    warn!("{} disconnected: {}", participant.username, cause);
                }
            }
            ConnectionEvent::Message {
                id,
                message: Message::Bye,
            } => {
                if let Some(participant) = self.registry.remove(id).await {
                    info!("{} left the session", participant.username);
                }
            }
            ConnectionEvent::Message { id, message } => {
                debug!("Ignoring {} from connection {}", message.kind(), id);
            }
        }
    }
}
