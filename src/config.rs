// MIT License - Copyright (c) 2026 craftbot-link contributors

use tokio::time::Duration;

/// Configuration for one TCP console connection.
///
/// Set before any I/O and immutable during a run. The defaults match a
/// plain G-code style terminal: `\n` delimited lines, responses terminated
/// by an `ok` line, and generous timeouts.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Device host name or IP address
    pub host: String,
    /// Device TCP port
    pub port: u16,
    /// Delimiter appended to every `Command` message and used to split
    /// response lines. Empty means raw, unframed responses.
    pub line_delimiter: String,
    /// Response line that marks a command as complete. Empty means the
    /// first full line completes the command.
    pub done_string: String,
    /// Match `done_string` as a substring of the line instead of the
    /// whole line.
    pub done_string_is_substring: bool,
    /// Treat any single read event as a complete response, with no line
    /// parsing. Used for binary chunk acknowledgments.
    pub ack_wait: bool,
    /// Close the socket after `run_queue` drains cleanly.
    pub auto_close_on_idle: bool,
    /// Bound on resolve + TCP connect
    pub connect_timeout: Duration,
    /// Bound on writing one framed message
    pub write_timeout: Duration,
    /// Bound on reading one complete response
    pub read_timeout: Duration,
    /// Pause between successive sends in `run_queue`
    pub inter_command_delay: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
            line_delimiter: "\n".to_string(),
            done_string: "ok".to_string(),
            done_string_is_substring: false,
            ack_wait: false,
            auto_close_on_idle: true,
            connect_timeout: Duration::from_millis(5000),
            write_timeout: Duration::from_millis(10000),
            read_timeout: Duration::from_millis(10000),
            inter_command_delay: Duration::ZERO,
        }
    }
}

impl ConsoleConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ConsoleConfigBuilder {
        ConsoleConfigBuilder::default()
    }
}

/// Builder for [`ConsoleConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConsoleConfigBuilder {
    config: ConsoleConfig,
}

impl ConsoleConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn line_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.config.line_delimiter = delimiter.into();
        self
    }

    pub fn done_string(mut self, done: impl Into<String>) -> Self {
        self.config.done_string = done.into();
        self
    }

    pub fn done_string_is_substring(mut self, substring: bool) -> Self {
        self.config.done_string_is_substring = substring;
        self
    }

    pub fn ack_wait(mut self, ack_wait: bool) -> Self {
        self.config.ack_wait = ack_wait;
        self
    }

    pub fn auto_close_on_idle(mut self, auto_close: bool) -> Self {
        self.config.auto_close_on_idle = auto_close;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn inter_command_delay(mut self, delay: Duration) -> Self {
        self.config.inter_command_delay = delay;
        self
    }

    pub fn build(self) -> ConsoleConfig {
        self.config
    }
}
