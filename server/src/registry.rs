//! Connection registry: the only shared mutable state of a trivia session
//!
//! This module tracks every joined participant together with the handles
//! needed to reach its connection:
//! - Participant identity, score and network address
//! - The outbound queue drained by the connection's writer task
//! - The reader task, aborted when the participant is removed
//! - The session phase, which decides whether new joins are still accepted
//!
//! Every operation takes the registry guard only for the duration of the
//! mutation or snapshot. Outbound messages are queued on per-connection
//! channels, so no guard is ever held while a socket write is in progress and
//! one stalled participant cannot block the others.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::AbortHandle;
use tokio::time::{timeout_at, Instant};
use trivia_shared::Message;

/// Opaque handle identifying one accepted connection
pub type ConnectionId = u32;

/// Lifecycle of the single session a server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Accepting connections until the cohort is full and live
    Admitting,
    /// Rounds are being played; joins are refused
    InProgress,
    /// Final standings sent and every connection closed
    Finished,
}

/// Commands consumed by a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    Send(Message),
    /// Zero-length write; replies whether the socket still accepts writes
    Probe(oneshot::Sender<bool>),
    /// Flush pending messages and close the write side
    Close,
}

/// A joined participant as seen from outside the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ConnectionId,
    pub username: String,
    pub addr: SocketAddr,
    /// Starts at zero and never decreases within a session
    pub score: u32,
}

struct Entry {
    participant: Participant,
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: Option<AbortHandle>,
}

impl Entry {
    fn shutdown(self) {
        if let Some(reader) = self.reader {
            reader.abort();
        }
    }
}

struct Roster {
    entries: BTreeMap<ConnectionId, Entry>,
    phase: SessionPhase,
}

/// Cloneable handle to the session's participant roster
#[derive(Clone)]
pub struct Registry {
    roster: Arc<RwLock<Roster>>,
    next_connection_id: Arc<AtomicU32>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            roster: Arc::new(RwLock::new(Roster {
                entries: BTreeMap::new(),
                phase: SessionPhase::Admitting,
            })),
            next_connection_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Hands out the id for a freshly accepted connection
    pub fn allocate_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a participant that completed its join handshake
    ///
    /// Returns the username actually assigned, or `None` once the session has
    /// left the admission phase. A name already in use gets a `#2`, `#3`, ...
    /// suffix so usernames stay unique keys for scoring.
    pub async fn add(
        &self,
        id: ConnectionId,
        addr: SocketAddr,
        username: &str,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Option<String> {
        let mut roster = self.roster.write().await;
        if roster.phase != SessionPhase::Admitting {
            return None;
        }

        let username = unique_username(&roster, username);
        info!("{} joined as connection {} from {}", username, id, addr);
        roster.entries.insert(
            id,
            Entry {
                participant: Participant {
                    id,
                    username: username.clone(),
                    addr,
                    score: 0,
                },
                outbound,
                reader: None,
            },
        );
        Some(username)
    }

    /// Associates the connection's reader task so removal can stop it.
    ///
    /// If the participant was removed before the reader was attached, the
    /// reader is stopped immediately.
    pub async fn attach_reader(&self, id: ConnectionId, reader: AbortHandle) {
        let mut roster = self.roster.write().await;
        match roster.entries.get_mut(&id) {
            Some(entry) => entry.reader = Some(reader),
            None => reader.abort(),
        }
    }

    /// Removes a participant and tears down its connection workers
    ///
    /// Returns the removed participant, or `None` if it was already gone.
    pub async fn remove(&self, id: ConnectionId) -> Option<Participant> {
        let entry = self.roster.write().await.entries.remove(&id)?;
        let participant = entry.participant.clone();
        entry.shutdown();
        info!("{} (connection {}) removed", participant.username, id);
        Some(participant)
    }

    /// Point-in-time copy of every participant, ordered by connection id
    pub async fn snapshot(&self) -> Vec<Participant> {
        self.roster
            .read()
            .await
            .entries
            .values()
            .map(|entry| entry.participant.clone())
            .collect()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.roster.read().await.entries.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.roster.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.roster.read().await.entries.is_empty()
    }

    /// Adds `delta` to the named participant's score
    ///
    /// Returns the new score, or `None` if nobody has that username.
    pub async fn update_score(&self, username: &str, delta: u32) -> Option<u32> {
        let mut roster = self.roster.write().await;
        let entry = roster
            .entries
            .values_mut()
            .find(|entry| entry.participant.username == username)?;
        entry.participant.score = entry.participant.score.saturating_add(delta);
        Some(entry.participant.score)
    }

    /// Queues a message for one participant
    ///
    /// A participant whose writer has already shut down is removed and
    /// `false` is returned.
    pub async fn send_to(&self, id: ConnectionId, message: Message) -> bool {
        let outbound = match self.roster.read().await.entries.get(&id) {
            Some(entry) => entry.outbound.clone(),
            None => return false,
        };

        if outbound.send(Outbound::Send(message)).is_err() {
            warn!("Connection {} is no longer writable", id);
            self.remove(id).await;
            return false;
        }
        true
    }

    /// Best-effort send to every participant
    ///
    /// Failed sends remove the affected participant instead of aborting the
    /// broadcast. Returns how many participants the message was queued for.
    pub async fn broadcast(&self, message: &Message) -> usize {
        let targets: Vec<(ConnectionId, mpsc::UnboundedSender<Outbound>)> = {
            let roster = self.roster.read().await;
            roster
                .entries
                .iter()
                .map(|(id, entry)| (*id, entry.outbound.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (id, outbound) in targets {
            if outbound.send(Outbound::Send(message.clone())).is_ok() {
                delivered += 1;
            } else {
                warn!("Dropping connection {} during {} broadcast", id, message.kind());
                self.remove(id).await;
            }
        }

        debug!("Broadcast {} to {} participants", message.kind(), delivered);
        delivered
    }

    /// Liveness re-check: probes every connection with a zero-length write.
    ///
    /// TCP cannot reliably detect a silently vanished peer, so this only
    /// catches connections the kernel already knows are broken. Participants
    /// whose probe fails or does not answer within `wait` are removed and
    /// returned.
    pub async fn probe_all(&self, wait: Duration) -> Vec<Participant> {
        let mut pending = Vec::new();
        let mut dead = Vec::new();
        {
            let roster = self.roster.read().await;
            for (id, entry) in &roster.entries {
                let (reply_tx, reply_rx) = oneshot::channel();
                if entry.outbound.send(Outbound::Probe(reply_tx)).is_ok() {
                    pending.push((*id, reply_rx));
                } else {
                    dead.push(*id);
                }
            }
        }

        let deadline = Instant::now() + wait;
        for (id, reply) in pending {
            if !matches!(timeout_at(deadline, reply).await, Ok(Ok(true))) {
                dead.push(id);
            }
        }

        let mut removed = Vec::new();
        for id in dead {
            if let Some(participant) = self.remove(id).await {
                warn!("{} failed the liveness check", participant.username);
                removed.push(participant);
            }
        }
        removed
    }

    /// Moves from admission to play if at least `target` participants are
    /// registered. The check and the phase change happen under one guard so
    /// no join can slip in between.
    pub async fn begin_session(&self, target: usize) -> bool {
        let mut roster = self.roster.write().await;
        if roster.phase == SessionPhase::Admitting && roster.entries.len() >= target {
            roster.phase = SessionPhase::InProgress;
            info!("Session phase: {:?}", roster.phase);
            true
        } else {
            false
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.roster.read().await.phase
    }

    /// Closes every connection after its queued messages are written and
    /// clears the roster.
    pub async fn close_all(&self) {
        let entries = {
            let mut roster = self.roster.write().await;
            roster.phase = SessionPhase::Finished;
            info!("Session phase: {:?}", roster.phase);
            std::mem::take(&mut roster.entries)
        };

        for (_, entry) in entries {
            let _ = entry.outbound.send(Outbound::Close);
            entry.shutdown();
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn unique_username(roster: &Roster, requested: &str) -> String {
    let taken = |name: &str| {
        roster
            .entries
            .values()
            .any(|entry| entry.participant.username == name)
    };

    if !taken(requested) {
        return requested.to_string();
    }

    let mut suffix = 2;
    loop {
        let candidate = format!("{}#{}", requested, suffix);
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    async fn join(
        registry: &Registry,
        username: &str,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.allocate_id();
        registry.add(id, test_addr(), username, tx).await.unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_registry_creation() {
        let registry = Registry::new();
        assert!(registry.is_empty().await);
        assert_eq!(registry.len().await, 0);
        assert_eq!(registry.phase().await, SessionPhase::Admitting);
    }

    #[tokio::test]
    async fn test_add_and_snapshot_in_join_order() {
        let registry = Registry::new();
        let (alice, _rx1) = join(&registry, "alice").await;
        let (bob, _rx2) = join(&registry, "bob").await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, alice);
        assert_eq!(snapshot[0].username, "alice");
        assert_eq!(snapshot[1].id, bob);
        assert!(snapshot.iter().all(|p| p.score == 0));
    }

    #[tokio::test]
    async fn test_duplicate_usernames_get_suffix() {
        let registry = Registry::new();
        let _a = join(&registry, "sam").await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let second = registry.add(99, test_addr(), "sam", tx).await;
        assert_eq!(second.as_deref(), Some("sam#2"));

        let (tx, _rx3) = mpsc::unbounded_channel();
        let third = registry.add(100, test_addr(), "sam", tx).await;
        assert_eq!(third.as_deref(), Some("sam#3"));
    }

    #[tokio::test]
    async fn test_remove_participant() {
        let registry = Registry::new();
        let (id, _rx) = join(&registry, "alice").await;

        let removed = registry.remove(id).await.unwrap();
        assert_eq!(removed.username, "alice");
        assert!(registry.is_empty().await);
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn test_update_score() {
        let registry = Registry::new();
        let _a = join(&registry, "alice").await;

        assert_eq!(registry.update_score("alice", 1).await, Some(1));
        assert_eq!(registry.update_score("alice", 1).await, Some(2));
        assert_eq!(registry.update_score("nobody", 1).await, None);
        assert_eq!(registry.snapshot().await[0].score, 2);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_live_connection() {
        let registry = Registry::new();
        let (_a, mut rx1) = join(&registry, "alice").await;
        let (_b, mut rx2) = join(&registry, "bob").await;

        let delivered = registry.broadcast(&Message::Bye).await;
        assert_eq!(delivered, 2);
        assert!(matches!(rx1.try_recv(), Ok(Outbound::Send(Message::Bye))));
        assert!(matches!(rx2.try_recv(), Ok(Outbound::Send(Message::Bye))));
    }

    #[tokio::test]
    async fn test_broadcast_removes_dead_connection() {
        let registry = Registry::new();
        let (_a, mut rx1) = join(&registry, "alice").await;
        let (_b, rx2) = join(&registry, "bob").await;
        drop(rx2);

        let delivered = registry.broadcast(&Message::Bye).await;
        assert_eq!(delivered, 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.snapshot().await[0].username, "alice");
        assert!(rx1.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_unknown_or_closed_connection() {
        let registry = Registry::new();
        assert!(!registry.send_to(42, Message::Bye).await);

        let (id, rx) = join(&registry, "alice").await;
        drop(rx);
        assert!(!registry.send_to(id, Message::Bye).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_probe_removes_unresponsive_connections() {
        let registry = Registry::new();
        let (_a, mut alive) = join(&registry, "alice").await;
        let (_b, _silent) = join(&registry, "bob").await;

        tokio::spawn(async move {
            while let Some(command) = alive.recv().await {
                if let Outbound::Probe(reply) = command {
                    let _ = reply.send(true);
                }
            }
        });

        let removed = registry.probe_all(Duration::from_millis(50)).await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].username, "bob");
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_begin_session_closes_admission() {
        let registry = Registry::new();
        let _a = join(&registry, "alice").await;
        assert!(!registry.begin_session(2).await);

        let _b = join(&registry, "bob").await;
        assert!(registry.begin_session(2).await);
        assert_eq!(registry.phase().await, SessionPhase::InProgress);

        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(registry.add(7, test_addr(), "late", tx).await.is_none());
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_close_all_sends_close_and_clears() {
        let registry = Registry::new();
        let (_a, mut rx) = join(&registry, "alice").await;
        registry.broadcast(&Message::Bye).await;
        registry.close_all().await;

        assert!(registry.is_empty().await);
        assert_eq!(registry.phase().await, SessionPhase::Finished);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Send(Message::Bye))));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }
}
