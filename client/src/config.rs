//! Client configuration file

use crate::error::ClientError;
use serde::Deserialize;
use std::path::Path;

/// How the client produces answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    /// The next stdin line within the time limit is the answer
    You,
    /// Answers are computed with the shared solver
    Auto,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub username: String,
    pub client_mode: ClientMode,
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClientError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"username": "alice", "client_mode": "auto"}"#).unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.client_mode, ClientMode::Auto);

        let config: ClientConfig =
            serde_json::from_str(r#"{"username": "bob", "client_mode": "you"}"#).unwrap();
        assert_eq!(config.client_mode, ClientMode::You);
    }

    #[test]
    fn test_unsupported_mode_is_rejected() {
        let parsed = serde_json::from_str::<ClientConfig>(r#"{"username": "x", "client_mode": "ai"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ClientConfig::load("/no/such/client.json"),
            Err(ClientError::ConfigMissing { .. })
        ));
    }
}
