//! Client event loop: stdin commands, server messages and answer deadlines

use crate::config::{ClientConfig, ClientMode};
use crate::error::ClientError;
use crate::game::TriviaState;
use crate::input::{parse_address, Command};
use log::{debug, info, warn};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use trivia_shared::{encode, FrameDecoder, Message};

const READ_BUFFER_SIZE: usize = 4096;

struct Connection {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    decoder: FrameDecoder,
}

impl Connection {
    async fn send(&mut self, message: &Message) -> Result<(), ClientError> {
        let bytes = encode(message)?;
        self.writer.write_all(&bytes).await?;
        Ok(())
    }

    async fn close(mut self) {
        if let Err(e) = self.send(&Message::Bye).await {
            debug!("Could not send BYE: {}", e);
        }
        let _ = self.writer.shutdown().await;
    }
}

pub struct Client<O> {
    config: ClientConfig,
    output: O,
    connection: Option<Connection>,
    state: TriviaState,
}

impl<O> Client<O>
where
    O: AsyncWrite + Unpin,
{
    pub fn new(config: ClientConfig, output: O) -> Self {
        let state = TriviaState::new(config.client_mode);
        Self {
            config,
            output,
            connection: None,
            state,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Runs until `EXIT`, or until stdin is closed and no session is active
    pub async fn run<R>(&mut self, input: R) -> Result<(), ClientError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut input_open = true;
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            if !input_open && !self.is_connected() {
                break;
            }

            let deadline = self.state.answer_deadline();

            tokio::select! {
                line = lines.next_line(), if input_open => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(&line).await? {
                                break;
                            }
                        }
                        None => {
                            debug!("Input closed");
                            input_open = false;
                        }
                    }
                }
                read = read_server(&mut self.connection, &mut buffer), if self.connection.is_some() => {
                    match read {
                        Ok(0) => self.drop_connection("Server closed the connection").await?,
                        Ok(read) => self.handle_bytes(&buffer[..read]).await?,
                        Err(e) => self.drop_connection(&format!("Connection lost: {}", e)).await?,
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.state.expire(Instant::now()) {
                        debug!("Time limit passed without an answer");
                    }
                }
            }
        }

        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        Ok(())
    }

    /// Returns `false` when the client should exit
    async fn handle_line(&mut self, line: &str) -> Result<bool, ClientError> {
        let command = Command::parse(line);

        if let Command::Text(text) = &command {
            if let Some(answer) = self.state.take_answer(text, Instant::now()) {
                self.send_answer(answer).await?;
                return Ok(true);
            }
        }

        match command {
            Command::Connect(address) => self.connect(&address).await?,
            Command::Disconnect => {
                self.state.reset();
                match self.connection.take() {
                    Some(connection) => {
                        connection.close().await;
                        info!("Disconnected");
                    }
                    None => self.print("Not connected").await?,
                }
            }
            Command::Exit => {
                self.state.reset();
                return Ok(false);
            }
            Command::Text(text) => debug!("Ignoring input {:?}", text),
        }
        Ok(true)
    }

    async fn connect(&mut self, address: &str) -> Result<(), ClientError> {
        if self.is_connected() {
            return self.print("Already connected").await;
        }

        match self.open_connection(address).await {
            Ok(connection) => {
                info!("Connected to {} as {}", address, self.config.username);
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                warn!("Connecting to {} failed: {}", address, e);
                self.print("Connection failed").await
            }
        }
    }

    async fn open_connection(&self, address: &str) -> Result<Connection, ClientError> {
        let (host, port) =
            parse_address(address).ok_or_else(|| ClientError::InvalidAddress(address.to_string()))?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        let (reader, writer) = stream.into_split();

        let mut connection = Connection {
            reader,
            writer,
            decoder: FrameDecoder::new(),
        };
        connection
            .send(&Message::Hi {
                username: self.config.username.clone(),
            })
            .await?;
        Ok(connection)
    }

    async fn handle_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        connection.decoder.extend(bytes);

        loop {
            let message = match self.connection.as_mut().map(|c| c.decoder.next_message()) {
                Some(Ok(Some(message))) => message,
                Some(Ok(None)) | None => return Ok(()),
                Some(Err(e)) => {
                    warn!("Ignoring undecodable message: {}", e);
                    continue;
                }
            };

            let reaction = self.state.handle_message(message, Instant::now());
            if let Some(text) = reaction.display {
                self.print(&text).await?;
            }
            if let Some(answer) = reaction.answer {
                self.send_answer(answer).await?;
            }
            if reaction.finished {
                // The server closes every connection after FINISHED.
                self.connection = None;
                return Ok(());
            }
        }
    }

    async fn send_answer(&mut self, answer: String) -> Result<(), ClientError> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        if self.config.client_mode == ClientMode::Auto {
            debug!("Answering {:?}", answer);
        }
        if let Err(e) = connection.send(&Message::Answer { answer }).await {
            return self.drop_connection(&format!("Sending answer failed: {}", e)).await;
        }
        Ok(())
    }

    async fn drop_connection(&mut self, reason: &str) -> Result<(), ClientError> {
        self.connection = None;
        self.state.reset();
        warn!("{}", reason);
        self.print("Disconnected from server").await
    }

    async fn print(&mut self, text: &str) -> Result<(), ClientError> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }
}

async fn read_server(connection: &mut Option<Connection>, buffer: &mut [u8]) -> io::Result<usize> {
    match connection {
        Some(connection) => connection.reader.read(buffer).await,
        None => std::future::pending().await,
    }
}
