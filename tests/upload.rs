// Upload protocol tests against an in-process mock Craftbot device.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use craftbot_link::{
    CraftbotLink, ErrorCode, PostUploadAction, UploadJob, UploadOutcome, CHUNK_SIZE,
};

/// Everything the mock device observed.
#[derive(Debug, Default)]
struct Observed {
    header: Option<String>,
    chunk_sizes: Vec<usize>,
    payload: Vec<u8>,
    uprint: Option<String>,
}

/// Mock device: answers `#GETSTATE` with the given state line, accepts one
/// `#UFILE` transfer (acking every chunk), records everything it sees.
/// Serves connections until the listener task is dropped; the client opens
/// one connection for the probe and one for the transfer.
async fn spawn_device(state_line: &'static str) -> (SocketAddr, Arc<Mutex<Observed>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let observed = Arc::new(Mutex::new(Observed::default()));
    let record = observed.clone();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let record = record.clone();
            tokio::spawn(async move {
                serve_connection(stream, state_line, record).await;
            });
        }
    });

    (addr, observed)
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    state_line: &'static str,
    record: Arc<Mutex<Observed>>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
        let command = line.trim_end().to_string();

        if command == "#GETSTATE" {
            write_half
                .write_all(format!("{state_line}\n").as_bytes())
                .await
                .unwrap();
        } else if let Some(args) = command.strip_prefix("#UFILE&") {
            record.lock().unwrap().header = Some(command.clone());
            let size: usize = args.rsplit(',').next().unwrap().parse().unwrap();
            write_half.write_all(b"ok\n").await.unwrap();

            let mut remaining = size;
            while remaining > 0 {
                let n = remaining.min(CHUNK_SIZE);
                let mut chunk = vec![0u8; n];
                if reader.read_exact(&mut chunk).await.is_err() {
                    // Client cancelled mid-transfer
                    return;
                }
                {
                    let mut obs = record.lock().unwrap();
                    obs.chunk_sizes.push(n);
                    obs.payload.extend_from_slice(&chunk);
                }
                write_half.write_all(b"ok\n").await.unwrap();
                remaining -= n;
            }
        } else if let Some(stem) = command.strip_prefix("#UPRINT&") {
            record.lock().unwrap().uprint = Some(stem.to_string());
            write_half.write_all(b"ok\n").await.unwrap();
        }
    }
}

fn temp_source(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

fn job_for(file: &tempfile::NamedTempFile, name: &str, post_action: PostUploadAction) -> UploadJob {
    UploadJob {
        source_path: file.path().to_path_buf(),
        remote_filename: name.to_string(),
        post_action,
    }
}

const READY: &str = "A,B,C,D,E,F,1";

#[tokio::test]
async fn upload_splits_file_into_fixed_chunks() {
    let (addr, observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let contents: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    let file = temp_source(&contents);
    let job = job_for(&file, "model.gcode", PostUploadAction::None);

    let reported = RefCell::new(Vec::new());
    let errors = Cell::new(0u32);
    let infos = Cell::new(0u32);

    let outcome = link
        .upload(
            &job,
            |progress, _cancel| {
                reported
                    .borrow_mut()
                    .push((progress.last_chunk.len(), progress.bytes_transferred));
            },
            |_err| errors.set(errors.get() + 1),
            |_topic, _msg| infos.set(infos.get() + 1),
        )
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Completed);
    assert_eq!(errors.get(), 0);
    assert_eq!(infos.get(), 1);

    // Chunk sizes and running totals, in order
    assert_eq!(
        *reported.borrow(),
        vec![(1024, 1024), (1024, 2048), (452, 2500)]
    );

    let obs = observed.lock().unwrap();
    assert_eq!(obs.header.as_deref(), Some("#UFILE&model.gcode,2500"));
    assert_eq!(obs.chunk_sizes, vec![1024, 1024, 452]);
    assert_eq!(obs.payload, contents);
    assert_eq!(obs.uprint, None);
}

#[tokio::test]
async fn exact_multiple_of_chunk_size_has_no_trailing_chunk() {
    let (addr, observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let contents = vec![0xA5u8; 2048];
    let file = temp_source(&contents);
    let job = job_for(&file, "model.gcode", PostUploadAction::None);

    let chunks = RefCell::new(Vec::new());
    link.upload(
        &job,
        |progress, _cancel| chunks.borrow_mut().push(progress.last_chunk.len()),
        |_err| {},
        |_topic, _msg| {},
    )
    .await
    .unwrap();

    assert_eq!(*chunks.borrow(), vec![1024, 1024]);
    assert_eq!(observed.lock().unwrap().chunk_sizes, vec![1024, 1024]);
}

#[tokio::test]
async fn empty_file_is_a_successful_empty_transfer() {
    let (addr, observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let file = temp_source(&[]);
    let job = job_for(&file, "empty.gcode", PostUploadAction::None);

    let progress_calls = Cell::new(0u32);
    let infos = Cell::new(0u32);
    let outcome = link
        .upload(
            &job,
            |_progress, _cancel| progress_calls.set(progress_calls.get() + 1),
            |_err| {},
            |_topic, _msg| infos.set(infos.get() + 1),
        )
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Completed);
    assert_eq!(progress_calls.get(), 0);
    assert_eq!(infos.get(), 1);

    let obs = observed.lock().unwrap();
    assert_eq!(obs.header.as_deref(), Some("#UFILE&empty.gcode,0"));
    assert!(obs.chunk_sizes.is_empty());
}

#[tokio::test]
async fn cancel_after_second_chunk_stops_transfer() {
    let (addr, observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let contents = vec![0x5Au8; 5 * 1024];
    let file = temp_source(&contents);
    let job = job_for(&file, "model.gcode", PostUploadAction::StartPrint);

    let calls = Cell::new(0u32);
    let last_transferred = Cell::new(0u64);
    let errors = Cell::new(0u32);

    let outcome = link
        .upload(
            &job,
            |progress, cancel| {
                calls.set(calls.get() + 1);
                last_transferred.set(progress.bytes_transferred);
                if calls.get() == 2 {
                    *cancel = true;
                }
            },
            |_err| errors.set(errors.get() + 1),
            |_topic, _msg| {},
        )
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Cancelled);
    assert_eq!(calls.get(), 2);
    assert_eq!(last_transferred.get(), 2048);
    // Cancellation is not a fault
    assert_eq!(errors.get(), 0);

    // Give the device task a moment to observe the close.
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    let obs = observed.lock().unwrap();
    assert_eq!(obs.chunk_sizes, vec![1024, 1024]);
    // Start print was requested but must not run after a cancel
    assert_eq!(obs.uprint, None);
}

#[tokio::test]
async fn start_print_uses_filename_without_extension() {
    let (addr, observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let file = temp_source(&[1u8; 100]);
    let job = job_for(&file, "benchy.gcode", PostUploadAction::StartPrint);

    let outcome = link
        .upload(&job, |_p, _c| {}, |_e| {}, |_t, _m| {})
        .await
        .unwrap();

    assert_eq!(outcome, UploadOutcome::Completed);
    let obs = observed.lock().unwrap();
    assert_eq!(obs.chunk_sizes, vec![100]);
    assert_eq!(obs.uprint.as_deref(), Some("benchy"));
}

#[tokio::test]
async fn speed_is_always_finite() {
    let (addr, _observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let file = temp_source(&[0u8; 3000]);
    let job = job_for(&file, "model.gcode", PostUploadAction::None);

    link.upload(
        &job,
        |progress, _cancel| {
            assert!(progress.speed_bytes_per_sec.is_finite());
            assert!(progress.speed_bytes_per_sec >= 0.0);
        },
        |_e| {},
        |_t, _m| {},
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn probe_failure_aborts_before_any_transfer() {
    let (addr, observed) = spawn_device("A,B,C,D,E,F,0").await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let file = temp_source(&[0u8; 100]);
    let job = job_for(&file, "model.gcode", PostUploadAction::None);

    let errors = Cell::new(0u32);
    let err = link
        .upload(
            &job,
            |_p, _c| panic!("no chunk should be sent"),
            |_e| errors.set(errors.get() + 1),
            |_t, _m| {},
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::DeviceNotReady);
    // Error sink fired exactly once for the failed operation
    assert_eq!(errors.get(), 1);
    assert!(observed.lock().unwrap().header.is_none());
}

#[tokio::test]
async fn malformed_state_fails_standalone_probe() {
    let (addr, _observed) = spawn_device("A,B,C").await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let err = link.test().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedDevice);
}

#[tokio::test]
async fn ready_device_passes_standalone_probe() {
    let (addr, _observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());
    link.test().await.unwrap();
}

#[tokio::test]
async fn missing_source_file_reports_file_open() {
    let (addr, _observed) = spawn_device(READY).await;
    let link = CraftbotLink::new(addr.ip().to_string(), addr.port());

    let job = UploadJob {
        source_path: "/nonexistent/path/model.gcode".into(),
        remote_filename: "model.gcode".to_string(),
        post_action: PostUploadAction::None,
    };

    let errors = Cell::new(0u32);
    let err = link
        .upload(
            &job,
            |_p, _c| {},
            |_e| errors.set(errors.get() + 1),
            |_t, _m| {},
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::FileOpen);
    assert_eq!(errors.get(), 1);
}
