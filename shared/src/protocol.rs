//! Line-delimited JSON wire protocol shared by the trivia server and client
//!
//! Every message is a single JSON object tagged by `message_type`, followed by
//! exactly one `\n`. A TCP read may deliver any number of complete lines plus a
//! trailing fragment, so decoding works on an accumulating buffer rather than
//! on individual reads.

use crate::questions::Category;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound for a single encoded line. Protects the accumulating buffer
/// from a peer that never sends a newline.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Every message exchanged between server and client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum Message {
    /// Join request sent by a client right after connecting
    #[serde(rename = "HI")]
    Hi { username: String },
    /// Graceful disconnect, valid in either direction
    #[serde(rename = "BYE")]
    Bye,
    #[serde(rename = "READY")]
    Ready { info: String },
    #[serde(rename = "QUESTION")]
    Question {
        question_type: Category,
        trivia_question: String,
        short_question: String,
        /// Seconds the participant has to answer
        time_limit: f64,
    },
    #[serde(rename = "ANSWER")]
    Answer { answer: String },
    #[serde(rename = "RESULT")]
    Result { correct: bool, feedback: String },
    #[serde(rename = "LEADERBOARD")]
    Leaderboard { state: String },
    #[serde(rename = "FINISHED")]
    Finished { final_standings: String },
}

impl Message {
    /// Wire tag of the message, used for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hi { .. } => "HI",
            Message::Bye => "BYE",
            Message::Ready { .. } => "READY",
            Message::Question { .. } => "QUESTION",
            Message::Answer { .. } => "ANSWER",
            Message::Result { .. } => "RESULT",
            Message::Leaderboard { .. } => "LEADERBOARD",
            Message::Finished { .. } => "FINISHED",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A complete line that is not a valid message. Only that line is lost;
    /// the buffer stays usable for whatever follows it.
    #[error("malformed message {line:?}: {source}")]
    MalformedMessage {
        line: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("message line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Serializes a message into one JSON object terminated by a newline.
///
/// `serde_json` escapes control characters inside strings, so the encoded
/// object never contains a raw newline of its own.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(message).map_err(ProtocolError::Encode)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Extracts the next complete message from the front of `buffer`.
///
/// Returns `Ok(None)` when no complete line is buffered; the incomplete tail
/// is left in place for the next read. Blank lines are skipped. A malformed
/// line is consumed before its error is returned.
pub fn decode(buffer: &mut Vec<u8>) -> Result<Option<Message>, ProtocolError> {
    loop {
        let newline = match buffer.iter().position(|b| *b == b'\n') {
            Some(index) => index,
            None => {
                if buffer.len() > MAX_LINE_LENGTH {
                    buffer.clear();
                    return Err(ProtocolError::LineTooLong {
                        limit: MAX_LINE_LENGTH,
                    });
                }
                return Ok(None);
            }
        };

        let line: Vec<u8> = buffer.drain(..=newline).collect();
        let line = trim_line(&line[..line.len() - 1]);
        if line.is_empty() {
            continue;
        }

        return serde_json::from_slice(line)
            .map(Some)
            .map_err(|source| ProtocolError::MalformedMessage {
                line: String::from_utf8_lossy(line).into_owned(),
                source,
            });
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &line[start..end]
}

/// Accumulating decoder for one byte stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        decode(&mut self.buffer)
    }

    /// Bytes of an incomplete trailing line still waiting for its newline
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_messages() -> Vec<Message> {
        vec![
            Message::Hi {
                username: "alice".to_string(),
            },
            Message::Bye,
            Message::Ready {
                info: "Game starts in 2 seconds!".to_string(),
            },
            Message::Question {
                question_type: Category::Mathematics,
                trivia_question: "Question 1 (Mathematics):\nWhat is 4 + 5?".to_string(),
                short_question: "4 + 5".to_string(),
                time_limit: 2.5,
            },
            Message::Answer {
                answer: "9".to_string(),
            },
            Message::Result {
                correct: false,
                feedback: "The correct answer is 9".to_string(),
            },
            Message::Leaderboard {
                state: "1. alice: 1 point\n2. bob: 0 points".to_string(),
            },
            Message::Finished {
                final_standings: "Final standings:\n1. alice: 1 point".to_string(),
            },
        ]
    }

    #[test]
    fn test_every_message_type_roundtrips() {
        for message in all_messages() {
            let mut encoded = encode(&message).unwrap();
            assert_eq!(encoded.last(), Some(&b'\n'));
            assert_eq!(encoded.iter().filter(|b| **b == b'\n').count(), 1);

            let decoded = decode(&mut encoded).unwrap();
            assert_eq!(decoded, Some(message));
            assert!(encoded.is_empty());
        }
    }

    #[test]
    fn test_wire_format_uses_message_type_tag() {
        let encoded = encode(&Message::Hi {
            username: "bob".to_string(),
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "{\"message_type\":\"HI\",\"username\":\"bob\"}\n"
        );

        let encoded = encode(&Message::Bye).unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "{\"message_type\":\"BYE\"}\n"
        );
    }

    #[test]
    fn test_decodes_messages_written_by_other_implementations() {
        let mut buffer =
            b"{\"message_type\": \"QUESTION\", \"question_type\": \"Roman Numerals\", \"trivia_question\": \"Q\", \"short_question\": \"XIV\", \"time_limit\": 2}\r\n"
                .to_vec();

        match decode(&mut buffer).unwrap() {
            Some(Message::Question {
                question_type,
                short_question,
                time_limit,
                ..
            }) => {
                assert_eq!(question_type, Category::RomanNumerals);
                assert_eq!(short_question, "XIV");
                assert_eq!(time_limit, 2.0);
            }
            other => panic!("Unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_embedded_newlines_are_escaped() {
        let message = Message::Leaderboard {
            state: "line one\nline two".to_string(),
        };
        let encoded = encode(&message).unwrap();
        let body = &encoded[..encoded.len() - 1];
        assert!(!body.contains(&b'\n'));
    }

    #[test]
    fn test_two_concatenated_messages_decode_in_order() {
        let mut buffer = encode(&Message::Answer {
            answer: "7".to_string(),
        })
        .unwrap();
        buffer.extend(encode(&Message::Bye).unwrap());

        assert_eq!(
            decode(&mut buffer).unwrap(),
            Some(Message::Answer {
                answer: "7".to_string()
            })
        );
        assert_eq!(decode(&mut buffer).unwrap(), Some(Message::Bye));
        assert_eq!(decode(&mut buffer).unwrap(), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_trailing_fragment_is_preserved() {
        let mut buffer = encode(&Message::Bye).unwrap();
        buffer.extend_from_slice(b"{\"message_type\":\"ANS");

        assert_eq!(decode(&mut buffer).unwrap(), Some(Message::Bye));
        assert_eq!(decode(&mut buffer).unwrap(), None);
        assert_eq!(buffer, b"{\"message_type\":\"ANS".to_vec());
    }

    #[test]
    fn test_frame_decoder_reassembles_split_reads() {
        let encoded = encode(&Message::Answer {
            answer: "MMXXIV".to_string(),
        })
        .unwrap();
        let (first, second) = encoded.split_at(10);

        let mut decoder = FrameDecoder::new();
        decoder.extend(first);
        assert!(decoder.next_message().unwrap().is_none());
        assert_eq!(decoder.pending(), first);

        decoder.extend(second);
        assert_eq!(
            decoder.next_message().unwrap(),
            Some(Message::Answer {
                answer: "MMXXIV".to_string()
            })
        );
        assert!(decoder.pending().is_empty());
    }

    #[test]
    fn test_malformed_line_fails_locally() {
        let mut buffer = b"not json\n".to_vec();
        buffer.extend(encode(&Message::Bye).unwrap());

        match decode(&mut buffer) {
            Err(ProtocolError::MalformedMessage { line, .. }) => assert_eq!(line, "not json"),
            other => panic!("Expected malformed message, got {:?}", other),
        }
        assert_eq!(decode(&mut buffer).unwrap(), Some(Message::Bye));
    }

    #[test]
    fn test_unknown_message_type_is_malformed() {
        let mut buffer = b"{\"message_type\":\"PING\"}\n".to_vec();
        assert!(matches!(
            decode(&mut buffer),
            Err(ProtocolError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut buffer = b"\n  \r\n".to_vec();
        buffer.extend(encode(&Message::Bye).unwrap());
        assert_eq!(decode(&mut buffer).unwrap(), Some(Message::Bye));
    }

    #[test]
    fn test_oversized_line_is_rejected() {
        let mut buffer = vec![b'x'; MAX_LINE_LENGTH + 1];
        assert!(matches!(
            decode(&mut buffer),
            Err(ProtocolError::LineTooLong { .. })
        ));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_message_kind_matches_wire_tag() {
        for message in all_messages() {
            let value: serde_json::Value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["message_type"], message.kind());
        }
    }
}
