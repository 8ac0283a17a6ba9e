//! Per-connection workers: join handshake, passive receive loop and writer
//!
//! Each accepted TCP stream is split into owned halves. The read half first
//! runs the join handshake and then keeps draining the stream, forwarding
//! every decoded message to the session as a [`ConnectionEvent`]. The write
//! half is owned by a writer task fed from the registry's outbound queue.

use crate::error::ConnectionError;
use crate::registry::{ConnectionId, Outbound, Registry};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use trivia_shared::{encode, FrameDecoder, Message};

const READ_BUFFER_SIZE: usize = 4096;

/// Notifications from connection workers to whoever drives the session
#[derive(Debug)]
pub enum ConnectionEvent {
    Message {
        id: ConnectionId,
        message: Message,
    },
    Disconnected {
        id: ConnectionId,
        cause: ConnectionError,
    },
}

/// Runs the join handshake for a freshly accepted stream and, on success,
/// registers the participant and spawns its reader and writer tasks.
///
/// Returns the username the participant was registered under.
pub async fn admit_connection(
    id: ConnectionId,
    stream: TcpStream,
    addr: SocketAddr,
    join_window: Duration,
    registry: &Registry,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> Result<String, ConnectionError> {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut decoder = FrameDecoder::new();

    let requested = match timeout(join_window, await_hi(&mut read_half, &mut decoder)).await {
        Ok(result) => result?,
        Err(_) => return Err(ConnectionError::JoinTimeout(join_window)),
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let username = match registry.add(id, addr, &requested, outbound_tx).await {
        Some(username) => username,
        None => {
            if let Ok(bye) = encode(&Message::Bye) {
                let _ = write_half.write_all(&bye).await;
            }
            return Err(ConnectionError::SessionStarted);
        }
    };

    tokio::spawn(send_loop(id, write_half, outbound_rx, events.clone()));
    let reader = tokio::spawn(receive_loop(id, read_half, decoder, events));
    registry.attach_reader(id, reader.abort_handle()).await;

    Ok(username)
}

/// Reads until a HI with a non-empty username arrives
///
/// Other messages before the HI are ignored. A BYE or end of stream rejects
/// the connection. Bytes following the HI stay in `decoder`.
pub async fn await_hi<R>(reader: &mut R, decoder: &mut FrameDecoder) -> Result<String, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        while let Some(message) = decoder.next_message()? {
            match message {
                Message::Hi { username } if !username.trim().is_empty() => {
                    return Ok(username.trim().to_string());
                }
                Message::Hi { .. } => debug!("Ignoring HI with an empty username"),
                Message::Bye => return Err(ConnectionError::Closed),
                other => debug!("Ignoring {} before HI", other.kind()),
            }
        }

        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            return Err(ConnectionError::Closed);
        }
        decoder.extend(&buffer[..read]);
    }
}

/// Forwards every message from a joined connection until it fails or closes
///
/// A malformed line ends the loop: the connection is treated as failed.
pub async fn receive_loop<R>(
    id: ConnectionId,
    mut reader: R,
    mut decoder: FrameDecoder,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    let cause = loop {
        loop {
            match decoder.next_message() {
                Ok(Some(message)) => {
                    if events
                        .send(ConnectionEvent::Message { id, message })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = events.send(ConnectionEvent::Disconnected {
                        id,
                        cause: e.into(),
                    });
                    return;
                }
            }
        }

        match reader.read(&mut buffer).await {
            Ok(0) => break ConnectionError::Closed,
            Ok(read) => decoder.extend(&buffer[..read]),
            Err(e) => break ConnectionError::ConnectionLost(e),
        }
    };

    debug!("Connection {} receive loop ended: {}", id, cause);
    let _ = events.send(ConnectionEvent::Disconnected { id, cause });
}

/// Writes queued messages to the socket in order
///
/// Ends on `Outbound::Close`, when the queue is dropped, or on the first
/// write error, which is reported as a disconnect.
pub async fn send_loop<W>(
    id: ConnectionId,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Send(message) => {
                let bytes = match encode(&message) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Skipping unencodable {} for connection {}: {}", message.kind(), id, e);
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&bytes).await {
                    warn!("Write to connection {} failed: {}", id, e);
                    let _ = events.send(ConnectionEvent::Disconnected {
                        id,
                        cause: e.into(),
                    });
                    return;
                }
            }
            Outbound::Probe(reply) => {
                let alive = match writer.write(&[]).await {
                    Ok(_) => writer.flush().await.is_ok(),
                    Err(_) => false,
                };
                let _ = reply.send(alive);
                if !alive {
                    return;
                }
            }
            Outbound::Close => break,
        }
    }

    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    info!("Connection {} closed", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;
    use tokio_test::io::Builder;

    fn line(message: &Message) -> Vec<u8> {
        encode(message).unwrap()
    }

    #[tokio::test]
    async fn test_await_hi_returns_trimmed_username() {
        let mut reader = Builder::new()
            .read(&line(&Message::Hi {
                username: "  alice ".to_string(),
            }))
            .build();
        let mut decoder = FrameDecoder::new();

        let username = await_hi(&mut reader, &mut decoder).await.unwrap();
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn test_await_hi_handles_split_reads_and_keeps_trailing_bytes() {
        let mut bytes = line(&Message::Hi {
            username: "bob".to_string(),
        });
        bytes.extend(line(&Message::Answer {
            answer: "early".to_string(),
        }));
        let (first, second) = bytes.split_at(7);

        let mut reader = Builder::new().read(first).read(second).build();
        let mut decoder = FrameDecoder::new();

        assert_eq!(await_hi(&mut reader, &mut decoder).await.unwrap(), "bob");
        assert_eq!(
            decoder.next_message().unwrap(),
            Some(Message::Answer {
                answer: "early".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_await_hi_skips_empty_username() {
        let mut bytes = line(&Message::Hi {
            username: "   ".to_string(),
        });
        bytes.extend(line(&Message::Hi {
            username: "carol".to_string(),
        }));
        let mut reader = Builder::new().read(&bytes).build();
        let mut decoder = FrameDecoder::new();

        assert_eq!(await_hi(&mut reader, &mut decoder).await.unwrap(), "carol");
    }

    #[tokio::test]
    async fn test_await_hi_rejects_closed_stream() {
        let mut reader = Builder::new().build();
        let mut decoder = FrameDecoder::new();

        assert!(matches!(
            await_hi(&mut reader, &mut decoder).await,
            Err(ConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_await_hi_rejects_malformed_line() {
        let mut reader = Builder::new().read(b"hello there\n").build();
        let mut decoder = FrameDecoder::new();

        assert!(matches!(
            await_hi(&mut reader, &mut decoder).await,
            Err(ConnectionError::MalformedMessage(_))
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_forwards_messages_then_reports_close() {
        let mut bytes = line(&Message::Answer {
            answer: "7".to_string(),
        });
        bytes.extend(line(&Message::Bye));
        let reader = Builder::new().read(&bytes).build();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        receive_loop(3, reader, FrameDecoder::new(), events_tx).await;

        match events_rx.recv().await {
            Some(ConnectionEvent::Message {
                id: 3,
                message: Message::Answer { answer },
            }) => assert_eq!(answer, "7"),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(matches!(
            events_rx.recv().await,
            Some(ConnectionEvent::Message {
                id: 3,
                message: Message::Bye
            })
        ));
        assert!(matches!(
            events_rx.recv().await,
            Some(ConnectionEvent::Disconnected {
                id: 3,
                cause: ConnectionError::Closed
            })
        ));
    }

    #[tokio::test]
    async fn test_receive_loop_treats_malformed_line_as_failure() {
        let reader = Builder::new().read(b"{broken\n").build();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        receive_loop(5, reader, FrameDecoder::new(), events_tx).await;

        assert!(matches!(
            events_rx.recv().await,
            Some(ConnectionEvent::Disconnected {
                id: 5,
                cause: ConnectionError::MalformedMessage(_)
            })
        ));
    }

    #[tokio::test]
    async fn test_send_loop_writes_lines_in_order() {
        let writer = Builder::new()
            .write(&line(&Message::Ready {
                info: "soon".to_string(),
            }))
            .write(&line(&Message::Bye))
            .build();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        outbound_tx
            .send(Outbound::Send(Message::Ready {
                info: "soon".to_string(),
            }))
            .unwrap();
        outbound_tx.send(Outbound::Send(Message::Bye)).unwrap();
        outbound_tx.send(Outbound::Close).unwrap();

        send_loop(1, writer, outbound_rx, events_tx).await;
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_loop_reports_write_failure() {
        let writer = Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer gone",
            ))
            .build();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (probe_tx, probe_rx) = oneshot::channel();

        outbound_tx.send(Outbound::Send(Message::Bye)).unwrap();
        outbound_tx.send(Outbound::Probe(probe_tx)).unwrap();

        send_loop(2, writer, outbound_rx, events_tx).await;

        assert!(matches!(
            events_rx.try_recv(),
            Ok(ConnectionEvent::Disconnected {
                id: 2,
                cause: ConnectionError::ConnectionLost(_)
            })
        ));
        assert!(probe_rx.await.is_err());
    }
}
