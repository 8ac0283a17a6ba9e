//! Client-side view of a trivia session
//!
//! Turns server messages into text to show and answers to send, and keeps
//! track of the question currently waiting for a typed answer. All timing is
//! passed in explicitly so the state machine can be tested without a clock.

use crate::config::ClientMode;
use std::time::Duration;
use tokio::time::Instant;
use trivia_shared::{Category, Message};

/// Longest answer window the client honours, whatever the server announces
const MAX_ANSWER_SECONDS: f64 = 86_400.0;

/// A question waiting for the participant to type an answer
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub category: Category,
    pub short_question: String,
    pub deadline: Instant,
}

/// What the client should do after a server message
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    pub display: Option<String>,
    pub answer: Option<String>,
    /// The session is over and the connection can be dropped
    pub finished: bool,
}

pub struct TriviaState {
    mode: ClientMode,
    pending: Option<PendingQuestion>,
}

impl TriviaState {
    pub fn new(mode: ClientMode) -> Self {
        Self {
            mode,
            pending: None,
        }
    }

    pub fn handle_message(&mut self, message: Message, now: Instant) -> Reaction {
        match message {
            Message::Ready { info } => Reaction {
                display: Some(info),
                ..Reaction::default()
            },
            Message::Question {
                question_type,
                trivia_question,
                short_question,
                time_limit,
            } => {
                // A new question supersedes one that was never answered.
                self.pending = None;
                let answer = match self.mode {
                    ClientMode::Auto => Some(question_type.solve(&short_question).unwrap_or_default()),
                    ClientMode::You => {
                        let limit =
                            Duration::try_from_secs_f64(time_limit.min(MAX_ANSWER_SECONDS))
                                .unwrap_or_default();
                        self.pending = Some(PendingQuestion {
                            category: question_type,
                            short_question,
                            deadline: now + limit,
                        });
                        None
                    }
                };
                Reaction {
                    display: Some(trivia_question),
                    answer,
                    finished: false,
                }
            }
            Message::Result { feedback, .. } => Reaction {
                display: Some(feedback),
                ..Reaction::default()
            },
            Message::Leaderboard { state } => Reaction {
                display: Some(state),
                ..Reaction::default()
            },
            Message::Finished { final_standings } => {
                self.pending = None;
                Reaction {
                    display: Some(final_standings),
                    answer: None,
                    finished: true,
                }
            }
            Message::Bye => {
                self.pending = None;
                Reaction {
                    finished: true,
                    ..Reaction::default()
                }
            }
            Message::Hi { .. } | Message::Answer { .. } => Reaction::default(),
        }
    }

    /// Uses a typed line as the answer to the open question, if any
    ///
    /// Returns `None` when no question is open or its time limit has passed,
    /// in which case the line is not an answer.
    pub fn take_answer(&mut self, line: &str, now: Instant) -> Option<String> {
        let pending = self.pending.take()?;
        if now >= pending.deadline {
            return None;
        }
        Some(line.to_string())
    }

    pub fn answer_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    pub fn pending(&self) -> Option<&PendingQuestion> {
        self.pending.as_ref()
    }

    /// Drops the open question once its time limit has passed
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.pending {
            Some(pending) if now >= pending.deadline => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}
