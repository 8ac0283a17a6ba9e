//! # Trivia Shared Library
//!
//! Types and logic shared by the trivia server and client.
//!
//! ## Protocol Module (`protocol`)
//! The newline-delimited JSON message set and the codec that frames it over a
//! byte stream. A single read may carry several messages or a partial one, so
//! decoding always works on an accumulating buffer.
//!
//! ## Questions Module (`questions`)
//! Question categories together with the question generator and answer grader
//! the server's session orchestrator calls between network phases. The client
//! reuses the same solver for its automatic answering mode.

pub mod protocol;
pub mod questions;

pub use protocol::{decode, encode, FrameDecoder, Message, ProtocolError};
pub use questions::{Category, Grade, Grader, QuestionGenerator, RandomQuestions, StandardGrader};
