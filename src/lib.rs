// MIT License - Copyright (c) 2026 craftbot-link contributors

//! # craftbot-link
//!
//! Device-upload transport for Craftbot 3D printers: push a model file to
//! a printer over a raw TCP "console" channel and optionally trigger print
//! start.
//!
//! The core is [`TcpConsole`], a line-oriented command/response client
//! with one request in flight at a time and connect/write/read deadlines,
//! and [`CraftbotLink`], the chunked upload protocol driven over it
//! (`#GETSTATE` probe, `#UFILE` header, 1024-byte data chunks, `#UPRINT`).
//! No external dependencies beyond tokio, thiserror, and tracing in the
//! library itself.
//!
//! ## Quick Start
//!
//! ```no_run
//! use craftbot_link::{CraftbotLink, PostUploadAction, UploadJob};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let link = CraftbotLink::new("10.0.1.91", 80);
//!     link.test().await?;
//!
//!     let job = UploadJob {
//!         source_path: "benchy.gcode".into(),
//!         remote_filename: "benchy.gcode".to_string(),
//!         post_action: PostUploadAction::StartPrint,
//!     };
//!
//!     let outcome = link
//!         .upload(
//!             &job,
//!             |progress, _cancel| {
//!                 println!(
//!                     "{}/{} bytes ({:.0} B/s)",
//!                     progress.bytes_transferred,
//!                     progress.bytes_total,
//!                     progress.speed_bytes_per_sec
//!                 );
//!             },
//!             |err| eprintln!("upload failed: {err}"),
//!             |topic, msg| println!("[{topic}] {msg}"),
//!         )
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod message;
pub mod upload;

// Re-exports for convenience
pub use config::{ConsoleConfig, ConsoleConfigBuilder};
pub use console::{ConnectionState, TcpConsole};
pub use error::{ErrorCode, ErrorDetail, LinkError, Result};
pub use host::{DeviceLink, HttpRequest, HttpResponse, HttpTransport, HttpVerb};
pub use message::{Message, MessageKind};
pub use upload::{
    CraftbotLink, FileSource, LocalFile, PostUploadAction, TransferProgress, UploadJob,
    UploadOutcome, CHUNK_SIZE,
};
