//! Server configuration loaded from a JSON file before the session starts
//!
//! The file holds everything an operator tunes: cohort size, port, the round
//! sequence and every text template the server renders. Values are validated
//! once at load time and are immutable afterwards; the session only ever sees
//! a shared `Arc<ServerConfig>`.

use crate::error::ConfigError;
use crate::template::render;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use trivia_shared::Category;

/// Upper bound for configured time values, one day
pub const MAX_SECONDS: f64 = 86_400.0;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Number of participants that must join before the session starts
    pub players: usize,
    /// One round per entry, played in order
    pub question_types: Vec<Category>,
    /// Display template per category, `{}` is replaced by the short question
    pub question_formats: HashMap<Category, String>,
    pub question_seconds: f64,
    #[serde(default = "default_question_interval")]
    pub question_interval_seconds: f64,
    #[serde(default = "default_ready_info")]
    pub ready_info: String,
    #[serde(default = "default_question_word")]
    pub question_word: String,
    #[serde(default = "default_correct_answer")]
    pub correct_answer: String,
    #[serde(default = "default_incorrect_answer")]
    pub incorrect_answer: String,
    #[serde(default = "default_points_singular")]
    pub points_noun_singular: String,
    #[serde(default = "default_points_plural")]
    pub points_noun_plural: String,
    #[serde(default = "default_final_standings_heading")]
    pub final_standings_heading: String,
    #[serde(default = "default_one_winner")]
    pub one_winner: String,
    #[serde(default = "default_multiple_winners")]
    pub multiple_winners: String,
}

fn default_question_interval() -> f64 {
    1.0
}

fn default_ready_info() -> String {
    "Game starts in {question_interval_seconds} seconds!".to_string()
}

fn default_question_word() -> String {
    "Question".to_string()
}

fn default_correct_answer() -> String {
    "{answer} is correct!".to_string()
}

fn default_incorrect_answer() -> String {
    "The correct answer is {correct_answer}, but your answer {answer} is incorrect :(".to_string()
}

fn default_points_singular() -> String {
    "point".to_string()
}

fn default_points_plural() -> String {
    "points".to_string()
}

fn default_final_standings_heading() -> String {
    "Final standings:".to_string()
}

fn default_one_winner() -> String {
    "The winner is: {}".to_string()
}

fn default_multiple_winners() -> String {
    "The winners are: {}".to_string()
}

impl ServerConfig {
    /// Reads, parses and validates a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.players == 0 {
            return Err(ConfigError::Invalid(
                "players must be at least 1".to_string(),
            ));
        }
        if self.question_types.is_empty() {
            return Err(ConfigError::Invalid(
                "question_types must not be empty".to_string(),
            ));
        }
        if !(self.question_seconds.is_finite() && self.question_seconds > 0.0) {
            return Err(ConfigError::Invalid(
                "question_seconds must be a positive number".to_string(),
            ));
        }
        if !(self.question_interval_seconds.is_finite() && self.question_interval_seconds >= 0.0) {
            return Err(ConfigError::Invalid(
                "question_interval_seconds must not be negative".to_string(),
            ));
        }
        if self.question_seconds > MAX_SECONDS || self.question_interval_seconds > MAX_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "question_seconds and question_interval_seconds must be at most {}",
                MAX_SECONDS
            )));
        }
        if let Some(category) = self
            .question_types
            .iter()
            .find(|category| !self.question_formats.contains_key(*category))
        {
            return Err(ConfigError::Invalid(format!(
                "question_formats has no entry for {}",
                category
            )));
        }
        Ok(())
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs_f64(self.question_seconds)
    }

    pub fn question_interval(&self) -> Duration {
        Duration::from_secs_f64(self.question_interval_seconds)
    }

    /// READY text with the config's own values substituted
    pub fn ready_info(&self) -> String {
        let players = self.players.to_string();
        let port = self.port.to_string();
        let seconds = self.question_seconds.to_string();
        let interval = self.question_interval_seconds.to_string();
        let count = self.question_types.len().to_string();
        render(
            &self.ready_info,
            &[],
            &[
                ("players", players.as_str()),
                ("port", port.as_str()),
                ("question_seconds", seconds.as_str()),
                ("question_interval_seconds", interval.as_str()),
                ("question_word", self.question_word.as_str()),
                ("question_count", count.as_str()),
            ],
        )
    }

    /// Full display text for round `index` (zero based)
    pub fn trivia_question(&self, index: usize, category: Category, short_question: &str) -> String {
        let body = self
            .question_formats
            .get(&category)
            .map(|format| render(format, &[short_question], &[]))
            .unwrap_or_else(|| short_question.to_string());
        format!(
            "{} {} ({}):\n{}",
            self.question_word,
            index + 1,
            category,
            body
        )
    }

    pub fn feedback(&self, answer: &str, correct_answer: &str, is_correct: bool) -> String {
        if is_correct {
            render(&self.correct_answer, &[], &[("answer", answer)])
        } else {
            render(
                &self.incorrect_answer,
                &[],
                &[("answer", answer), ("correct_answer", correct_answer)],
            )
        }
    }

    pub fn points_noun(&self, score: u32) -> &str {
        if score == 1 {
            &self.points_noun_singular
        } else {
            &self.points_noun_plural
        }
    }

    /// Heading naming the sole winner or every co-winner
    pub fn winner_heading(&self, winners: &[&str]) -> String {
        match winners {
            [] => String::new(),
            [winner] => render(&self.one_winner, &[*winner], &[]),
            _ => {
                let joined = winners.join(", ");
                render(&self.multiple_winners, &[joined.as_str()], &[])
            }
        }
    }
}

/// Timing knobs that are not part of the configuration file
///
/// The defaults are the production values; tests shrink them to keep whole
/// sessions under a second.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// How long a fresh connection has to send its HI
    pub join_window: Duration,
    /// Pause before the liveness re-check once the cohort is full
    pub liveness_settle: Duration,
    /// How long a liveness probe may take before the participant counts as dead
    pub probe_timeout: Duration,
    /// Added to the round's time limit when collecting answers
    pub answer_grace: Duration,
    /// Upper bound for a single wait during answer collection
    pub poll_interval: Duration,
    /// Pause around RESULT delivery so late-arriving writes drain
    pub result_settle: Duration,
    /// Leaderboard pause is the round's time limit divided by this
    pub leaderboard_pause_divisor: u32,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            join_window: Duration::from_secs(3),
            liveness_settle: Duration::from_millis(300),
            probe_timeout: Duration::from_millis(500),
            answer_grace: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            result_settle: Duration::from_millis(100),
            leaderboard_pause_divisor: 4,
        }
    }
}

impl SessionTiming {
    pub fn leaderboard_pause(&self, time_limit: Duration) -> Duration {
        time_limit / self.leaderboard_pause_divisor.max(1)
    }
}
