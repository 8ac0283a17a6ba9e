//! Parsing of the commands typed on stdin

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `CONNECT host:port`
    Connect(String),
    Disconnect,
    Exit,
    /// Anything else; only meaningful as an answer while a question is open
    Text(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "DISCONNECT" => return Command::Disconnect,
            "EXIT" => return Command::Exit,
            _ => {}
        }

        let mut parts = trimmed.split_whitespace();
        if parts.next() == Some("CONNECT") {
            if let (Some(address), None) = (parts.next(), parts.next()) {
                return Command::Connect(address.to_string());
            }
        }

        Command::Text(trimmed.to_string())
    }
}

/// Splits `host:port`, accepting bracketed IPv6 hosts
pub fn parse_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}
