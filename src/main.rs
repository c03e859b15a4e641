use clap::Parser;
use file_tail::{Encoding, TailEvent, TailFile, TailOptions};
use std::path::PathBuf;
use std::process;
use tokio::io::AsyncWriteExt;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Follow a file through rotation and truncation, copying new bytes to stdout.
#[derive(Parser, Debug)]
#[command(name = "file-tail", version, about, long_about = None)]
struct Cli {
    /// File to follow
    file: PathBuf,

    /// JSON file with session options (camelCase keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Milliseconds between polls
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Milliseconds between polls while the file is missing
    #[arg(long)]
    retry_ms: Option<u64>,

    /// Consecutive missing-file polls before giving up
    #[arg(long)]
    max_poll_failures: Option<u32>,

    /// Byte offset to start from (default: end of file)
    #[arg(long, allow_negative_numbers = true, conflicts_with = "from_start")]
    start_pos: Option<i64>,

    /// Start from the beginning of the file
    #[arg(long)]
    from_start: bool,

    /// Decode data as text (utf8, latin1)
    #[arg(long)]
    encoding: Option<Encoding>,

    /// Maximum bytes per read
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Also poll early on filesystem notifications
    #[arg(long)]
    watch_events: bool,
}

impl Cli {
    fn options(&self) -> file_tail::Result<TailOptions> {
        let mut options = match &self.config {
            Some(path) => TailOptions::from_json(&std::fs::read_to_string(path)?)?,
            None => TailOptions::default(),
        };

        if let Some(ms) = self.poll_interval_ms {
            options.poll_file_interval_ms = ms;
        }
        if let Some(ms) = self.retry_ms {
            options.poll_failure_retry_ms = ms;
        }
        if let Some(max) = self.max_poll_failures {
            options.max_poll_failures = max;
        }
        if self.from_start {
            options.start_pos = Some(0);
        }
        if let Some(pos) = self.start_pos {
            options.start_pos = Some(pos);
        }
        if let Some(encoding) = self.encoding {
            options.encoding = Some(encoding);
        }
        if let Some(size) = self.chunk_size {
            options.read_stream_opts.chunk_size = size;
        }
        if self.watch_events {
            options.watch_events = true;
        }

        Ok(options)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut tail = match cli.options().and_then(|options| TailFile::new(&cli.file, options)) {
        Ok(tail) => tail,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = tail.start().await {
        error!("Error starting tail: {}", e);
        process::exit(1);
    }
    info!(path = %cli.file.display(), "following file");

    let mut stdout = tokio::io::stdout();
    let mut exit_code = 0;
    let mut quitting = false;

    loop {
        let event = tokio::select! {
            event = tail.next() => event,
            _ = tokio::signal::ctrl_c(), if !quitting => {
                quitting = true;
                let position = tail.quit().await;
                info!(position, "interrupted, stopping");
                continue;
            }
        };

        let Some(event) = event else { break };
        match event {
            TailEvent::Data(chunk) => {
                if let Err(e) = stdout.write_all(chunk.as_bytes()).await {
                    error!("Error writing to stdout: {}", e);
                    tail.quit().await;
                    exit_code = 1;
                    break;
                }
            }
            TailEvent::Flush { .. } => {
                let _ = stdout.flush().await;
            }
            TailEvent::Renamed { filename, when } => {
                info!(path = %filename.display(), %when, "file renamed or replaced");
            }
            TailEvent::Truncated { filename, when } => {
                warn!(path = %filename.display(), %when, "file truncated");
            }
            TailEvent::Retry {
                filename, attempts, ..
            } => {
                warn!(path = %filename.display(), attempts, "file missing, retrying");
            }
            TailEvent::ReadError(e) => warn!("Read error: {}", e),
            TailEvent::Error(e) => {
                error!("Error following file: {}", e);
                exit_code = 1;
            }
        }
    }

    let _ = stdout.flush().await;
    process::exit(exit_code);
}
