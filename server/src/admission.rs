//! Admission controller: fills the cohort before the session starts
//!
//! Accepted connections complete their join handshake on their own tasks, so
//! a slow or silent client never holds up the accept loop. Whenever a join
//! brings the registry up to the target size, the cohort is re-checked for
//! liveness before admission is closed.

use crate::config::SessionTiming;
use crate::connection::{admit_connection, ConnectionEvent};
use crate::error::ConnectionError;
use crate::registry::Registry;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::sleep;
use trivia_shared::Message;

pub struct AdmissionController<'a> {
    listener: &'a TcpListener,
    registry: Registry,
    timing: SessionTiming,
    target: usize,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl<'a> AdmissionController<'a> {
    pub fn new(
        listener: &'a TcpListener,
        registry: Registry,
        timing: SessionTiming,
        target: usize,
        events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            listener,
            registry,
            timing,
            target,
            events_tx,
        }
    }

    /// Accepts connections until `target` live participants have joined and
    /// the registry has moved into the in-progress phase.
    ///
    /// Events from joined connections are handled here until then, so a
    /// participant leaving during admission frees its slot.
    pub async fn fill_cohort(&self, events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (joined_tx, mut joined_rx) = mpsc::unbounded_channel::<String>();
        info!("Waiting for {} participants", self.target);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let id = self.registry.allocate_id();
                            debug!("Accepted connection {} from {}", id, addr);

                            let registry = self.registry.clone();
                            let events_tx = self.events_tx.clone();
                            let joined_tx = joined_tx.clone();
                            let join_window = self.timing.join_window;

                            tokio::spawn(async move {
                                match admit_connection(id, stream, addr, join_window, &registry, events_tx).await {
                                    Ok(username) => {
                                        let _ = joined_tx.send(username);
                                    }
                                    Err(ConnectionError::SessionStarted) => {
                                        info!("Turned away {} after the session started", addr);
                                    }
                                    Err(e) => warn!("Join from {} failed: {}", addr, e),
                                }
                            });
                        }
                        Err(e) => {
                            warn!("Error accepting connection: {}", e);
                            sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
                Some(username) = joined_rx.recv() => {
                    let joined = self.registry.len().await;
                    info!("{} joined ({}/{})", username, joined, self.target);

                    if joined >= self.target && self.confirm_cohort(events).await {
                        return;
                    }
                }
                Some(event) = events.recv() => {
                    self.handle_event(event).await;
                }
            }
        }
    }

    /// Liveness re-check once the cohort looks full
    ///
    /// A zero-length write only catches peers the kernel already knows are
    /// gone; a silently vanished peer still passes.
    async fn confirm_cohort(&self, events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> bool {
        sleep(self.timing.liveness_settle).await;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event).await;
        }

        let dropped = self.registry.probe_all(self.timing.probe_timeout).await;
        if !dropped.is_empty() {
            warn!(
                "{} participants failed the liveness check, resuming admission",
                dropped.len()
            );
        }

        if self.registry.begin_session(self.target).await {
            info!("Cohort complete with {} participants", self.registry.len().await);
            true
        } else {
            false
        }
    }

    async fn handle_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Disconnected { id, cause } => {
                if let Some(participant) = self.registry.remove(id).await {
                    warn!("{} disconnected before the start: {}", participant.username, cause);
                }
            }
            ConnectionEvent::Message {
                id,
                message: Message::Bye,
            } => {
                if let Some(participant) = self.registry.remove(id).await {
                    info!("{} left before the start", participant.username);
                }
            }
            ConnectionEvent::Message { id, message } => {
                debug!("Ignoring {} from connection {} during admission", message.kind(), id);
            }
        }
    }
}
