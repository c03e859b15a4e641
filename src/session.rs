//! The background task behind a [`TailFile`](crate::TailFile).
//!
//! One task per followed file. It stats the path on a timer, classifies what
//! changed, and streams new bytes into a bounded channel. Every push waits
//! for channel capacity, so a slow consumer leaves unread bytes on disk
//! instead of in memory. Only one poll runs at a time: the next timer is
//! armed after the current poll, including any streaming it started, is done.

use crate::detector::{Change, FileIdentity, classify};
use crate::error::Error;
use crate::event::{Decoder, TailEvent};
use crate::options::TailOptions;
use crate::reader;
use crate::watcher::FileWatcher;
use chrono::Utc;
use std::io;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// When the next poll runs, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Interval,
    Retry,
    Stop,
}

impl From<ControlFlow<()>> for Schedule {
    fn from(flow: ControlFlow<()>) -> Self {
        match flow {
            ControlFlow::Continue(()) => Schedule::Interval,
            ControlFlow::Break(()) => Schedule::Stop,
        }
    }
}

pub(crate) struct Session {
    filename: PathBuf,
    options: TailOptions,
    identity: Option<FileIdentity>,
    file: Option<File>,
    position: u64,
    size_at_open: u64,
    awaiting_start: bool,
    poll_failures: u32,
    decoder: Decoder,
    tx: mpsc::Sender<TailEvent>,
    shutdown: CancellationToken,
    last_read_position: Arc<AtomicU64>,
}

impl Session {
    /// Opens the file and fixes the starting position.
    pub(crate) async fn open(
        filename: PathBuf,
        options: TailOptions,
        tx: mpsc::Sender<TailEvent>,
        shutdown: CancellationToken,
        last_read_position: Arc<AtomicU64>,
    ) -> Result<Self, Error> {
        let opened = reader::open_file(&filename)
            .await
            .map_err(|source| Error::Open {
                path: filename.clone(),
                source,
            })?;

        let size = opened.stat.size;
        let position = options.start_offset().unwrap_or(size);
        last_read_position.store(position, Ordering::Release);

        info!(path = %filename.display(), position, size, "opened file for tailing");

        Ok(Self {
            decoder: Decoder::new(options.encoding),
            filename,
            options,
            identity: Some(opened.stat.identity),
            file: Some(opened.file),
            position,
            size_at_open: size,
            awaiting_start: position > size,
            poll_failures: 0,
            tx,
            shutdown,
            last_read_position,
        })
    }

    /// Delivers anything already present past the start position, then
    /// polls until quit or a fatal failure.
    pub(crate) async fn run(mut self) {
        let mut watcher = self.start_watcher();
        let mut schedule = Schedule::from(self.stream_range(self.position, self.size_at_open).await);

        loop {
            let delay = match schedule {
                Schedule::Interval => self.options.poll_interval(),
                Schedule::Retry => self.options.retry_interval(),
                Schedule::Stop => break,
            };
            let wake_early = schedule == Schedule::Interval;

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                Some(()) = next_wake(&mut watcher), if wake_early => {
                    debug!(path = %self.filename.display(), "woken early by filesystem event");
                }
            }

            schedule = self.poll_once().await;
        }

        self.close();
    }

    /// One stat-classify-react cycle.
    async fn poll_once(&mut self) -> Schedule {
        if self.shutdown.is_cancelled() {
            return Schedule::Stop;
        }

        let stat = match reader::stat_path(&self.filename).await {
            Ok(stat) => stat,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.file_missing().await,
            Err(source) => {
                error!(path = %self.filename.display(), error = %source, "stat failed");
                let _ = self
                    .emit(TailEvent::Error(Error::Stat {
                        path: self.filename.clone(),
                        source,
                    }))
                    .await;
                return Schedule::Stop;
            }
        };

        self.poll_failures = 0;
        if stat.size >= self.position {
            self.awaiting_start = false;
        }

        let change = classify(self.identity, self.position, self.awaiting_start, stat);
        debug!(
            path = %self.filename.display(),
            ?change,
            position = self.position,
            size = stat.size,
            "polled file"
        );

        let flow = match change {
            Change::Rotated => self.rotate().await,
            Change::Truncated => self.truncated(stat.size).await,
            Change::Grew { from, to } => self.stream_range(from, to).await,
            Change::Unchanged => ControlFlow::Continue(()),
        };
        flow.into()
    }

    async fn file_missing(&mut self) -> Schedule {
        self.poll_failures += 1;
        let attempts = self.poll_failures;

        if attempts >= self.options.max_poll_failures {
            error!(path = %self.filename.display(), attempts, "file still missing, giving up");
            let _ = self
                .emit(TailEvent::Error(Error::PollFailed {
                    path: self.filename.clone(),
                    attempts,
                }))
                .await;
            return Schedule::Stop;
        }

        warn!(path = %self.filename.display(), attempts, "file missing, retrying");
        let retry = TailEvent::Retry {
            filename: self.filename.clone(),
            attempts,
            when: Utc::now(),
        };
        match self.emit(retry).await {
            ControlFlow::Continue(()) => Schedule::Retry,
            ControlFlow::Break(()) => Schedule::Stop,
        }
    }

    /// The path now names another file. Finish the old one, then start the
    /// new one from offset 0.
    async fn rotate(&mut self) -> ControlFlow<()> {
        let stale_size = match &self.file {
            Some(file) => Some(reader::handle_size(file).await),
            None => None,
        };
        match stale_size {
            Some(Ok(size)) if size > self.position && !self.awaiting_start => {
                debug!(
                    path = %self.filename.display(),
                    from = self.position,
                    to = size,
                    "draining renamed file before reopening"
                );
                self.stream_range(self.position, size).await?;
            }
            Some(Err(e)) => debug!(error = %e, "could not size stale handle"),
            _ => {}
        }
        // Dropping the handle closes it; close errors are not reported.
        self.file = None;

        let opened = match reader::open_file(&self.filename).await {
            Ok(opened) => opened,
            Err(source) => {
                self.identity = None;
                return self.read_failed(source).await;
            }
        };

        info!(path = %self.filename.display(), "file renamed or replaced, reading new file from start");
        self.file = Some(opened.file);
        self.identity = Some(opened.stat.identity);
        self.poll_failures = 0;
        self.awaiting_start = false;
        self.flush_decoder().await?;
        self.set_position(0);
        self.emit(TailEvent::Renamed {
            filename: self.filename.clone(),
            when: Utc::now(),
        })
        .await?;

        self.stream_range(0, opened.stat.size).await
    }

    async fn truncated(&mut self, size: u64) -> ControlFlow<()> {
        warn!(
            path = %self.filename.display(),
            position = self.position,
            size,
            "file truncated, reading from start"
        );
        self.flush_decoder().await?;
        self.emit(TailEvent::Truncated {
            filename: self.filename.clone(),
            when: Utc::now(),
        })
        .await?;
        self.set_position(0);

        self.stream_range(0, size).await
    }

    /// Pushes `[from, to)` in bounded chunks. The position only moves once
    /// a chunk has been accepted by the channel.
    async fn stream_range(&mut self, from: u64, to: u64) -> ControlFlow<()> {
        if from >= to {
            return ControlFlow::Continue(());
        }
        if self.shutdown.is_cancelled() {
            return ControlFlow::Break(());
        }

        let chunk_size = self.options.read_stream_opts.chunk_size;
        let mut position = from;
        let mut delivered = false;

        while position < to {
            let Some(file) = self.file.as_mut() else {
                break;
            };
            let chunk = match reader::read_chunk(file, position, to, chunk_size).await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(source) => {
                    self.read_failed(source).await?;
                    break;
                }
            };

            let len = chunk.len() as u64;
            if let Some(decoded) = self.decoder.decode(chunk) {
                self.emit(TailEvent::Data(decoded)).await?;
            }
            position += len;
            self.set_position(position);
            delivered = true;
        }

        if delivered {
            debug!(path = %self.filename.display(), from, to = position, "streamed new bytes");
            self.emit(TailEvent::Flush {
                last_read_position: self.delivered_position(),
            })
            .await?;
        }
        ControlFlow::Continue(())
    }

    /// Reports a failed read without ending the session. The next poll
    /// re-checks identity and reopens if the handle went stale.
    async fn read_failed(&mut self, source: io::Error) -> ControlFlow<()> {
        // Only a missing file may reach the ceiling.
        let ceiling = self.options.max_poll_failures.saturating_sub(1);
        self.poll_failures = (self.poll_failures + 1).min(ceiling);
        warn!(
            path = %self.filename.display(),
            error = %source,
            failures = self.poll_failures,
            "read failed"
        );
        self.emit(TailEvent::ReadError(Error::Read {
            path: self.filename.clone(),
            source,
        }))
        .await
    }

    /// Emits text held back by the decoder before the source changes.
    async fn flush_decoder(&mut self) -> ControlFlow<()> {
        match self.decoder.reset() {
            Some(chunk) => self.emit(TailEvent::Data(chunk)).await,
            None => ControlFlow::Continue(()),
        }
    }

    /// Waits for room in the channel. Breaks on quit or a dropped consumer.
    async fn emit(&self, event: TailEvent) -> ControlFlow<()> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => ControlFlow::Break(()),
            sent = self.tx.send(event) => match sent {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            },
        }
    }

    /// Moves the read offset. The published offset trails it by any bytes
    /// the decoder still holds, so it only covers delivered data.
    fn set_position(&mut self, position: u64) {
        self.position = position;
        self.last_read_position.store(self.delivered_position(), Ordering::Release);
    }

    fn delivered_position(&self) -> u64 {
        self.position.saturating_sub(self.decoder.pending_len() as u64)
    }

    fn start_watcher(&self) -> Option<FileWatcher> {
        if !self.options.watch_events {
            return None;
        }
        let started = FileWatcher::new(&self.filename).and_then(|mut watcher| {
            watcher.start_watching()?;
            Ok(watcher)
        });
        match started {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "file watcher unavailable, relying on polling");
                None
            }
        }
    }

    fn close(&mut self) {
        self.file = None;
        info!(
            path = %self.filename.display(),
            position = self.delivered_position(),
            "tail session stopped"
        );
    }
}

async fn next_wake(watcher: &mut Option<FileWatcher>) -> Option<()> {
    match watcher {
        Some(watcher) => watcher.wait().await,
        None => std::future::pending().await,
    }
}
