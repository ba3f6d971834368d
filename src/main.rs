// MIT License - Copyright (c) 2026 craftbot-link contributors
// Command-line uploader

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use craftbot_link::{CraftbotLink, PostUploadAction, UploadJob, UploadOutcome};

#[derive(Parser)]
#[command(name = "craftbot-link")]
#[command(about = "Upload model files to a Craftbot printer over its TCP console")]
struct Cli {
    /// Printer host name or IP address
    #[arg(long)]
    host: String,

    /// Printer TCP port
    #[arg(long, default_value_t = 80)]
    port: u16,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Check that the printer is reachable and ready to receive a file
    Test,
    /// Upload a file, optionally starting the print afterwards
    Upload {
        /// Path of the file to upload
        file: PathBuf,

        /// File name to store on the device (defaults to the local name)
        #[arg(long)]
        remote_name: Option<String>,

        /// Start printing the file once the upload completes
        #[arg(long)]
        start_print: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "craftbot_link=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let link = CraftbotLink::new(cli.host.clone(), cli.port);

    match cli.command {
        CliCommand::Test => {
            link.test()
                .await
                .with_context(|| format!("Could not reach Craftbot device at {}", cli.host))?;
            println!("Craftbot device is reachable.");
        }
        CliCommand::Upload {
            file,
            remote_name,
            start_print,
        } => {
            let remote_filename = match remote_name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .context("File path has no file name")?,
            };

            let job = UploadJob {
                source_path: file,
                remote_filename,
                post_action: if start_print {
                    PostUploadAction::StartPrint
                } else {
                    PostUploadAction::None
                },
            };

            info!("Uploading {} to {}", job.remote_filename, cli.host);
            let outcome = link
                .upload(
                    &job,
                    |progress, _cancel| {
                        print!(
                            "\r{}/{} bytes ({:.0} B/s)",
                            progress.bytes_transferred,
                            progress.bytes_total,
                            progress.speed_bytes_per_sec
                        );
                        let _ = std::io::stdout().flush();
                    },
                    |err| eprintln!("\nUpload failed: {err}"),
                    |topic, msg| println!("\n[{topic}] {msg}"),
                )
                .await?;

            if outcome == UploadOutcome::Cancelled {
                bail!("Upload cancelled");
            }
        }
    }

    Ok(())
}
