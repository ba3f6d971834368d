// MIT License - Copyright (c) 2026 craftbot-link contributors

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info};

use crate::config::ConsoleConfig;
use crate::console::TcpConsole;
use crate::error::{LinkError, Result};
use crate::message::Message;

/// Fixed upload chunk size. The final chunk of a file may be shorter.
pub const CHUNK_SIZE: usize = 1024;

/// Pause between the transfer header and the first chunk, giving the
/// device time to set up its receive buffer.
const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// 0-based index of the pendrive-ready flag in the `#GETSTATE` response
const READY_TOKEN_INDEX: usize = 6;
/// Responses with fewer comma-separated fields than this are not a
/// Craftbot state report at all
const MIN_STATE_TOKENS: usize = 4;

const PROBE_COMMAND: &str = "#GETSTATE";

/// Per-chunk progress report handed to the progress sink.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub bytes_total: u64,
    /// Monotonically non-decreasing within one transfer
    pub bytes_transferred: u64,
    pub last_chunk: Vec<u8>,
    /// `bytes_transferred / elapsed_secs`, 0 while no time has elapsed
    pub speed_bytes_per_sec: f64,
}

/// How an upload ended when no fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Completed,
    /// The progress sink set the cancel flag; the remaining chunks were
    /// never sent and no post-action ran.
    Cancelled,
}

/// Caller-requested follow-up step after a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostUploadAction {
    #[default]
    None,
    StartPrint,
}

/// One upload request: which file, what to call it on the device, and
/// what to do afterwards.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub source_path: PathBuf,
    /// File name as stored on the device (with extension)
    pub remote_filename: String,
    pub post_action: PostUploadAction,
}

/// Sequential byte reader behind an upload.
///
/// `read_chunk` must fill the buffer completely except at end of file, so
/// that every chunk but the last has the full [`CHUNK_SIZE`] length.
#[allow(async_fn_in_trait)]
pub trait FileSource {
    fn total_size(&self) -> u64;
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    async fn rewind(&mut self) -> std::io::Result<()>;
}

/// [`FileSource`] over a file on disk.
pub struct LocalFile {
    file: tokio::fs::File,
    size: u64,
}

impl LocalFile {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|source| LinkError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?;
        let size = file
            .metadata()
            .await
            .map_err(|source| LinkError::FileOpen {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok(Self { file, size })
    }
}

impl FileSource for LocalFile {
    fn total_size(&self) -> u64 {
        self.size
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        // A single read may return short mid-file; keep filling until the
        // buffer is full or the file ends.
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    async fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(std::io::SeekFrom::Start(0)).await?;
        Ok(())
    }
}

/// Upload driver for Craftbot devices speaking the TCP console protocol.
///
/// Drives one file transfer to completion or cancellation using only the
/// [`TcpConsole`] primitives: readiness probe, transfer header, fixed-size
/// data chunks, optional start-print command. Each probe or upload call
/// uses its own engine instance and socket; concurrent transfers need
/// separate `CraftbotLink` calls and never share an engine.
pub struct CraftbotLink {
    host: String,
    port: u16,
}

impl CraftbotLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Console used for the standalone readiness probe.
    fn probe_console(&self) -> TcpConsole {
        TcpConsole::new(
            ConsoleConfig::builder()
                .host(self.host.clone())
                .port(self.port)
                .line_delimiter("\n")
                .done_string("")
                .done_string_is_substring(true)
                .write_timeout(Duration::from_millis(2000))
                .read_timeout(Duration::from_millis(2000))
                .build(),
        )
    }

    /// Console used for the transfer itself: chunk sends are raw data and
    /// each one waits for a single ack read.
    fn upload_console(&self) -> TcpConsole {
        TcpConsole::new(
            ConsoleConfig::builder()
                .host(self.host.clone())
                .port(self.port)
                .line_delimiter("\n")
                .done_string("")
                .done_string_is_substring(true)
                .ack_wait(true)
                .write_timeout(Duration::from_millis(2000))
                .read_timeout(Duration::from_millis(2000))
                .build(),
        )
    }

    /// Connectivity and readiness test: send `#GETSTATE` and check the
    /// pendrive-ready flag. Also runs as a precondition of every upload.
    pub async fn test(&self) -> Result<()> {
        let mut console = self.probe_console();
        let result = probe(&mut console).await;
        console.disconnect();
        result
    }

    /// Upload a file from disk per the job description.
    ///
    /// The progress sink runs once per chunk and may set its `cancel`
    /// argument; cancellation takes effect between chunks. The error sink
    /// runs at most once, and not at all for a cancellation. The info sink
    /// fires on successful completion.
    pub async fn upload(
        &self,
        job: &UploadJob,
        mut progress_fn: impl FnMut(&TransferProgress, &mut bool),
        mut error_fn: impl FnMut(&str),
        mut info_fn: impl FnMut(&str, &str),
    ) -> Result<UploadOutcome> {
        let mut source = match LocalFile::open(&job.source_path).await {
            Ok(source) => source,
            Err(err) => {
                error_fn(&err.to_string());
                return Err(err);
            }
        };
        self.upload_from(
            &mut source,
            &job.remote_filename,
            job.post_action,
            &mut progress_fn,
            &mut error_fn,
            &mut info_fn,
        )
        .await
    }

    /// Upload from any [`FileSource`]. Same contract as [`upload`](Self::upload).
    pub async fn upload_from(
        &self,
        source: &mut impl FileSource,
        remote_filename: &str,
        post_action: PostUploadAction,
        progress_fn: &mut impl FnMut(&TransferProgress, &mut bool),
        error_fn: &mut impl FnMut(&str),
        info_fn: &mut impl FnMut(&str, &str),
    ) -> Result<UploadOutcome> {
        // Probe before send, on its own connection.
        if let Err(err) = self.test().await {
            error_fn(&err.to_string());
            return Err(err);
        }

        let mut console = self.upload_console();
        let result = transfer(&mut console, source, remote_filename, post_action, progress_fn).await;
        // Scoped release: the engine is dropped connected on no path.
        console.disconnect();

        match result {
            Ok(()) => {
                info!("Upload of {} complete", remote_filename);
                info_fn("craftbot", "Upload successful");
                Ok(UploadOutcome::Completed)
            }
            Err(LinkError::Cancelled) => {
                info!("Upload of {} cancelled by user", remote_filename);
                Ok(UploadOutcome::Cancelled)
            }
            Err(err) => {
                error!("Upload of {} failed: {}", remote_filename, err);
                error_fn(&err.to_string());
                Err(err)
            }
        }
    }
}

/// Send `#GETSTATE` on the given console and evaluate the response.
async fn probe(console: &mut TcpConsole) -> Result<()> {
    let line = console
        .send_and_receive(&Message::command(PROBE_COMMAND))
        .await?;
    parse_probe_response(&line)
}

/// Evaluate one `#GETSTATE` response line.
///
/// Fewer than [`MIN_STATE_TOKENS`] comma-separated fields means the peer
/// is not a Craftbot. A missing or unset ready flag means the pendrive is
/// not available.
fn parse_probe_response(line: &str) -> Result<()> {
    let tokens: Vec<&str> = line.split(',').collect();
    if tokens.len() < MIN_STATE_TOKENS {
        return Err(LinkError::UnsupportedDevice {
            response: line.to_string(),
        });
    }
    if tokens.get(READY_TOKEN_INDEX).copied() != Some("1") {
        return Err(LinkError::DeviceNotReady);
    }
    Ok(())
}

/// The transfer sequence proper: header, settle delay, chunk loop,
/// optional start-print. Cancellation surfaces as `LinkError::Cancelled`
/// so the caller can tell it apart from a fault.
async fn transfer(
    console: &mut TcpConsole,
    source: &mut impl FileSource,
    remote_filename: &str,
    post_action: PostUploadAction,
    progress_fn: &mut impl FnMut(&TransferProgress, &mut bool),
) -> Result<()> {
    let bytes_total = source.total_size();

    let header = Message::command(format!("#UFILE&{},{}", remote_filename, bytes_total));
    // Response payload of the header is not meaningful, only its arrival.
    console.send_and_receive(&header).await?;

    // Device-side buffer setup latency
    sleep(SETTLE_DELAY).await;

    let started = Instant::now();
    let mut bytes_transferred: u64 = 0;
    let mut cancel = false;
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = source.read_chunk(&mut buf).await.map_err(LinkError::Io)?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];

        console.send_and_receive(&Message::data(chunk.to_vec())).await?;

        bytes_transferred += n as u64;
        let elapsed = started.elapsed().as_secs_f64();
        let speed_bytes_per_sec = if elapsed > 0.0 {
            bytes_transferred as f64 / elapsed
        } else {
            0.0
        };
        debug!(
            "Chunk sent: {}/{} bytes ({:.0} B/s)",
            bytes_transferred, bytes_total, speed_bytes_per_sec
        );

        let progress = TransferProgress {
            bytes_total,
            bytes_transferred,
            last_chunk: chunk.to_vec(),
            speed_bytes_per_sec,
        };
        progress_fn(&progress, &mut cancel);

        // Cancellation is checked only between chunks, never mid-send.
        if cancel {
            return Err(LinkError::Cancelled);
        }
    }

    if post_action == PostUploadAction::StartPrint {
        let stem = filename_stem(remote_filename);
        debug!("Requesting print start for {}", stem);
        console
            .send_and_receive(&Message::command(format!("#UPRINT&{}", stem)))
            .await?;
    }

    Ok(())
}

/// The remote file name without its extension, as `#UPRINT` expects.
fn filename_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}
