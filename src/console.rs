// MIT License - Copyright (c) 2026 craftbot-link contributors

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info};

use crate::config::ConsoleConfig;
use crate::error::{ErrorDetail, LinkError, Result};
use crate::message::{Message, MessageKind};

/// Lifecycle of the one socket a [`TcpConsole`] owns.
///
/// Transitions run forward only, except that a peer-side close drops a
/// `Connected` engine back to `Disconnected`. An explicit `disconnect`
/// always lands in `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

const READ_BUF_SIZE: usize = 4096;

/// Generic command/response TCP telnet-like console.
///
/// Owns one TCP connection and executes one request/response exchange at a
/// time: the command queue is drained strictly FIFO, there is never more
/// than one outstanding request, and every connect/write/read races a
/// deadline. Exclusive ownership is enforced at the type level — all I/O
/// entry points take `&mut self`, so no two exchanges can interleave on
/// the same engine.
pub struct TcpConsole {
    config: ConsoleConfig,
    state: ConnectionState,
    stream: Option<TcpStream>,
    queue: VecDeque<Message>,
    /// Bytes read from the socket but not yet consumed as a line
    recv_buffer: Vec<u8>,
    last_error: Option<ErrorDetail>,
}

impl TcpConsole {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            stream: None,
            queue: VecDeque::new(),
            recv_buffer: Vec::new(),
            last_error: None,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// The most recent failure recorded by any engine operation.
    pub fn last_error(&self) -> Option<&ErrorDetail> {
        self.last_error.as_ref()
    }

    /// Append a message to the command queue. Insertion order is
    /// transmission order.
    pub fn enqueue(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Resolve the configured host and establish the TCP connection.
    ///
    /// Resolution and connect together are bounded by `connect_timeout`,
    /// computed once up front.
    pub async fn connect(&mut self) -> Result<()> {
        match self.do_connect().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.record(err)),
        }
    }

    async fn do_connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            return Ok(());
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        let deadline = Instant::now() + self.config.connect_timeout;

        info!("Connecting to {}:{}", host, port);
        self.state = ConnectionState::Connecting;

        let addrs = match timeout_at(deadline, tokio::net::lookup_host((host.clone(), port))).await
        {
            Ok(Ok(addrs)) => addrs.collect::<Vec<_>>(),
            Ok(Err(e)) => {
                error!("Resolve failed for {}: {}", host, e);
                self.state = ConnectionState::Disconnected;
                return Err(LinkError::ResolveFailed { host, port });
            }
            Err(_) => {
                self.state = ConnectionState::Disconnected;
                return Err(LinkError::ResolveFailed { host, port });
            }
        };

        if addrs.is_empty() {
            self.state = ConnectionState::Disconnected;
            return Err(LinkError::ResolveFailed { host, port });
        }

        let mut last_io_error: Option<std::io::Error> = None;
        for addr in addrs {
            match timeout_at(deadline, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    debug!("TCP socket connected to {}", addr);
                    self.stream = Some(stream);
                    self.state = ConnectionState::Connected;
                    self.recv_buffer.clear();
                    return Ok(());
                }
                Ok(Err(e)) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_io_error = Some(e);
                }
                Err(_) => {
                    self.state = ConnectionState::Disconnected;
                    return Err(LinkError::ConnectFailed {
                        host,
                        port,
                        reason: "connect timeout".to_string(),
                    });
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        let reason = last_io_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no usable address".to_string());
        error!("Could not connect to {}:{}: {}", host, port, reason);
        Err(LinkError::ConnectFailed { host, port, reason })
    }

    /// Write one message and read its complete response.
    ///
    /// Lazily connects when the engine is not yet connected. The write is
    /// bounded by `write_timeout`; the read by a single deadline computed
    /// once at its start — partial progress never extends it. On a read
    /// timeout the socket stays connected; no implicit reconnect happens.
    pub async fn send_and_receive(&mut self, message: &Message) -> Result<String> {
        match self.exchange(message).await {
            Ok(line) => Ok(line),
            Err(err) => Err(self.record(err)),
        }
    }

    async fn exchange(&mut self, message: &Message) -> Result<String> {
        if self.state != ConnectionState::Connected {
            self.do_connect().await?;
        }

        self.write_message(message).await?;
        self.read_response().await
    }

    async fn write_message(&mut self, message: &Message) -> Result<()> {
        let framed = message.framed(&self.config.line_delimiter);
        let write_timeout = self.config.write_timeout;
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;

        match message.kind() {
            MessageKind::Command => {
                debug!(
                    "Sending command: {}",
                    String::from_utf8_lossy(message.payload())
                );
            }
            MessageKind::Data => {
                debug!("Sending {} raw bytes", message.payload().len());
            }
        }

        match timeout(write_timeout, stream.write_all(&framed)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("Write failed: {}", e);
                Err(LinkError::Io(e))
            }
            Err(_) => {
                error!("Write timed out after {:?}", write_timeout);
                Err(LinkError::WriteTimeout {
                    timeout_ms: write_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn read_response(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.config.read_timeout;
        let timeout_ms = self.config.read_timeout.as_millis() as u64;

        if self.config.ack_wait {
            // Any single read event is the complete response, no parsing.
            if !self.recv_buffer.is_empty() {
                let ack = String::from_utf8_lossy(&self.recv_buffer).into_owned();
                self.recv_buffer.clear();
                return Ok(ack);
            }
            let n = self.read_more(deadline, timeout_ms).await?;
            let ack = String::from_utf8_lossy(&self.recv_buffer[..n]).into_owned();
            self.recv_buffer.clear();
            return Ok(ack);
        }

        if self.config.line_delimiter.is_empty() {
            // Unframed: any non-empty read completes.
            if self.recv_buffer.is_empty() {
                self.read_more(deadline, timeout_ms).await?;
            }
            let response = String::from_utf8_lossy(&self.recv_buffer).into_owned();
            self.recv_buffer.clear();
            return Ok(response);
        }

        // Line framing: read full lines until one satisfies the done rule,
        // discarding intermediates. The deadline covers the whole wait.
        let delimiter = self.config.line_delimiter.clone();
        loop {
            while let Some(line) = extract_line(&mut self.recv_buffer, delimiter.as_bytes()) {
                debug!("Received line: {}", line);
                if line_is_done(
                    &line,
                    &self.config.done_string,
                    self.config.done_string_is_substring,
                ) {
                    return Ok(line);
                }
            }
            self.read_more(deadline, timeout_ms).await?;
        }
    }

    /// One socket read appended to `recv_buffer`, raced against the
    /// operation deadline. Returns the number of bytes read.
    async fn read_more(&mut self, deadline: Instant, timeout_ms: u64) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotConnected)?;
        let mut buf = [0u8; READ_BUF_SIZE];

        match timeout_at(deadline, stream.read(&mut buf)).await {
            Ok(Ok(0)) => {
                debug!("Connection closed by peer");
                self.stream = None;
                self.state = ConnectionState::Disconnected;
                Err(LinkError::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                self.recv_buffer.extend_from_slice(&buf[..n]);
                Ok(n)
            }
            Ok(Err(e)) => {
                error!("Read failed: {}", e);
                self.stream = None;
                self.state = ConnectionState::Disconnected;
                Err(LinkError::Io(e))
            }
            Err(_) => {
                error!("Read timed out after {}ms", timeout_ms);
                Err(LinkError::ReadTimeout { timeout_ms })
            }
        }
    }

    /// Drain the command queue FIFO, one `send_and_receive` per message.
    ///
    /// Stops at the first failure, leaving the remaining messages queued.
    /// Waits `inter_command_delay` between successive sends. After a clean
    /// drain the socket is closed when `auto_close_on_idle` is set.
    pub async fn run_queue(&mut self) -> Result<()> {
        let mut first = true;
        while let Some(message) = self.queue.pop_front() {
            if !first && !self.config.inter_command_delay.is_zero() {
                sleep(self.config.inter_command_delay).await;
            }
            first = false;

            if let Err(err) = self.send_and_receive(&message).await {
                debug!("run_queue stopping: {} ({} left)", err, self.queue.len());
                return Err(err);
            }
        }

        if self.config.auto_close_on_idle {
            self.disconnect();
        }
        Ok(())
    }

    /// Close the socket if open. Idempotent; safe before any connect.
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            info!("Disconnected from {}:{}", self.config.host, self.config.port);
        }
        self.recv_buffer.clear();
        self.state = ConnectionState::Closed;
    }

    fn record(&mut self, err: LinkError) -> LinkError {
        self.last_error = Some(ErrorDetail::from_error(&err));
        err
    }
}

/// Pop the first complete delimited line off `buf`, consuming the
/// delimiter. Returns `None` while no full line is buffered.
fn extract_line(buf: &mut Vec<u8>, delimiter: &[u8]) -> Option<String> {
    debug_assert!(!delimiter.is_empty());
    let pos = buf
        .windows(delimiter.len())
        .position(|window| window == delimiter)?;
    let line = String::from_utf8_lossy(&buf[..pos]).into_owned();
    buf.drain(..pos + delimiter.len());
    Some(line)
}

/// Whether a response line satisfies the configured done rule.
fn line_is_done(line: &str, done_string: &str, substring: bool) -> bool {
    if done_string.is_empty() {
        return true;
    }
    if substring {
        line.contains(done_string)
    } else {
        line == done_string
    }
}
