// MIT License - Copyright (c) 2026 craftbot-link contributors

use std::fmt;
use std::path::PathBuf;

/// Stable machine-readable code for every failure the library can report.
///
/// Codes survive error formatting, so callers (and `last_error`) can branch
/// on the kind of failure without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Host name did not resolve
    Resolve,
    /// TCP connection could not be established within the connect timeout
    Connect,
    /// Write did not complete within the write timeout
    WriteTimeout,
    /// No completion condition was met within the read timeout
    ReadTimeout,
    /// Peer closed the connection before a response completed
    ConnectionClosed,
    /// Operation requires an established connection
    NotConnected,
    /// Probe response was malformed (too few status fields)
    UnsupportedDevice,
    /// Probe readiness flag was not set
    DeviceNotReady,
    /// Source file could not be opened or read
    FileOpen,
    /// Transfer stopped by the caller's cancel flag
    Cancelled,
    /// Other I/O failure
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Connect => "connect",
            Self::WriteTimeout => "write_timeout",
            Self::ReadTimeout => "read_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::NotConnected => "not_connected",
            Self::UnsupportedDevice => "unsupported_device",
            Self::DeviceNotReady => "device_not_ready",
            Self::FileOpen => "file_open",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors that can occur in the craftbot-link library.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Could not resolve {host}:{port}")]
    ResolveFailed { host: String, port: u16 },

    #[error("Could not connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Write timed out after {timeout_ms}ms")]
    WriteTimeout { timeout_ms: u64 },

    #[error("Read timed out after {timeout_ms}ms")]
    ReadTimeout { timeout_ms: u64 },

    #[error("Connection closed by device")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Unsupported device: {response:?}")]
    UnsupportedDevice { response: String },

    #[error("The pendrive is not being recognized by the device")]
    DeviceNotReady,

    #[error("Failed to open file {}: {source}", .path.display())]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Upload cancelled by user")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ResolveFailed { .. } => ErrorCode::Resolve,
            Self::ConnectFailed { .. } => ErrorCode::Connect,
            Self::WriteTimeout { .. } => ErrorCode::WriteTimeout,
            Self::ReadTimeout { .. } => ErrorCode::ReadTimeout,
            Self::ConnectionClosed => ErrorCode::ConnectionClosed,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::UnsupportedDevice { .. } => ErrorCode::UnsupportedDevice,
            Self::DeviceNotReady => ErrorCode::DeviceNotReady,
            Self::FileOpen { .. } => ErrorCode::FileOpen,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Io(_) => ErrorCode::Io,
        }
    }

    /// Whether this error is the caller's own cancel signal rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Code plus human-readable message of the most recent failure,
/// as kept by the console engine for `last_error`.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorDetail {
    pub fn from_error(err: &LinkError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
