//! The public tail session: lifecycle control plus the event stream.

use crate::error::{Error, Result};
use crate::event::{Chunk, TailEvent};
use crate::options::{TailOptions, validate_filename};
use crate::session::Session;
use futures::future;
use futures::stream::{FusedStream, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Follows one file, yielding [`TailEvent`]s as it changes.
///
/// Construction only validates. [`start`](TailFile::start) opens the file
/// and spawns the poll loop; [`quit`](TailFile::quit) stops it. Whatever
/// ends the session, the stream yields a final [`TailEvent::Flush`] and then
/// `None`. Dropping a `TailFile` stops its poll loop.
pub struct TailFile {
    filename: PathBuf,
    options: TailOptions,
    receiver: mpsc::Receiver<TailEvent>,
    sender: Option<mpsc::Sender<TailEvent>>,
    shutdown: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
    last_read_position: Arc<AtomicU64>,
    terminated: bool,
}

impl TailFile {
    /// Validates the file name and options. Nothing is opened yet.
    pub fn new<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Self> {
        let filename = path.as_ref().to_path_buf();
        validate_filename(&filename)?;
        options.validate()?;

        let (tx, rx) = mpsc::channel(options.read_stream_opts.high_water_mark);
        let initial_position = options.start_offset().unwrap_or(0);

        Ok(Self {
            filename,
            options,
            receiver: rx,
            sender: Some(tx),
            shutdown: CancellationToken::new(),
            task_handle: None,
            last_read_position: Arc::new(AtomicU64::new(initial_position)),
            terminated: false,
        })
    }

    /// Opens the file, fixes the start position and begins polling.
    ///
    /// Fails if the file cannot be opened, e.g. because it does not exist.
    pub async fn start(&mut self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Quit);
        }
        if self.task_handle.is_some() {
            return Err(Error::AlreadyStarted);
        }
        let Some(tx) = self.sender.clone() else {
            return Err(Error::Quit);
        };

        let session = Session::open(
            self.filename.clone(),
            self.options.clone(),
            tx,
            self.shutdown.clone(),
            Arc::clone(&self.last_read_position),
        )
        .await?;

        // The session now owns the only sender, so the stream ends with it.
        self.sender = None;
        self.task_handle = Some(tokio::spawn(session.run()));
        Ok(())
    }

    /// Stops polling, closes the file and ends the stream.
    ///
    /// Safe to call any number of times, before or after `start`. Events
    /// already buffered are still delivered ahead of the final flush.
    /// Returns the offset of the next unread byte.
    pub async fn quit(&mut self) -> u64 {
        if !self.shutdown.is_cancelled() {
            info!(path = %self.filename.display(), "quitting tail session");
        }
        self.shutdown.cancel();
        self.sender = None;

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "tail session task ended abnormally");
            }
        }

        self.last_read_position()
    }

    /// Offset of the next byte that has not been pushed to the stream.
    pub fn last_read_position(&self) -> u64 {
        self.last_read_position.load(Ordering::Acquire)
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Whether the poll loop is live: started, not quit, not failed.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
            && self
                .task_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Narrows the session to its content: data chunks as `Ok`, fatal
    /// errors as `Err`. Signals and recoverable read errors are dropped.
    pub fn data(self) -> impl Stream<Item = Result<Chunk>> + Unpin {
        self.filter_map(|event| {
            future::ready(match event {
                TailEvent::Data(chunk) => Some(Ok(chunk)),
                TailEvent::Error(e) => Some(Err(e)),
                _ => None,
            })
        })
    }
}

impl Drop for TailFile {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Stream for TailFile {
    type Item = TailEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.terminated {
            return Poll::Ready(None);
        }

        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                self.terminated = true;
                Poll::Ready(Some(TailEvent::Flush {
                    last_read_position: self.last_read_position(),
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for TailFile {
    fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Encoding, ReadStreamOptions};
    use crate::test_helpers::TempLogFile;
    use std::time::Duration;
    use tokio_test::{assert_pending, assert_ready, task};

    fn fast_options() -> TailOptions {
        TailOptions {
            poll_file_interval_ms: 20,
            poll_failure_retry_ms: 10,
            ..Default::default()
        }
    }

    async fn next_event(tail: &mut TailFile) -> Option<TailEvent> {
        tokio::time::timeout(Duration::from_secs(5), tail.next())
            .await
            .expect("timed out waiting for an event")
    }

    async fn next_data(tail: &mut TailFile) -> Vec<u8> {
        loop {
            match next_event(tail).await {
                Some(TailEvent::Data(chunk)) => return chunk.as_bytes().to_vec(),
                Some(TailEvent::Error(e)) => panic!("Unexpected error: {}", e),
                Some(_) => continue,
                None => panic!("Stream ended while waiting for data"),
            }
        }
    }

    /// Collects events until the stream ends.
    async fn collect_until_end(tail: &mut TailFile) -> Vec<TailEvent> {
        let mut events = Vec::new();
        while let Some(event) = next_event(tail).await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_rejects_empty_filename() {
        let error = TailFile::new("", TailOptions::default()).err().unwrap();
        assert_eq!(error.code(), Some("EFILENAME"));
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let options = TailOptions {
            max_poll_failures: 0,
            ..Default::default()
        };
        let error = TailFile::new("app.log", options).err().unwrap();
        assert_eq!(error.code(), Some("EMAXPOLLFAIL"));
    }

    #[tokio::test]
    async fn test_start_missing_file_fails() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.remove().unwrap();

        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        let result = tail.start().await;

        assert!(matches!(result, Err(Error::Open { .. })));
        assert!(!tail.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let temp_file = TempLogFile::new().unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();

        tail.start().await.unwrap();
        assert!(tail.is_running());
        assert!(matches!(tail.start().await, Err(Error::AlreadyStarted)));

        tail.quit().await;
    }

    #[tokio::test]
    async fn test_start_after_quit_fails() {
        let temp_file = TempLogFile::new().unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();

        tail.quit().await;
        assert!(matches!(tail.start().await, Err(Error::Quit)));
    }

    #[tokio::test]
    async fn test_quit_before_start_ends_stream() {
        let temp_file = TempLogFile::new().unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();

        assert_eq!(tail.quit().await, 0);
        assert_eq!(tail.quit().await, 0);

        let events = collect_until_end(&mut tail).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TailEvent::Flush {
                last_read_position: 0
            }
        ));
        assert!(tail.is_terminated());
        assert!(tail.next().await.is_none());
    }

    #[tokio::test]
    async fn test_quit_is_idempotent_after_start() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        tail.start().await.unwrap();

        assert_eq!(tail.quit().await, 7);
        assert_eq!(tail.quit().await, 7);
        assert!(!tail.is_running());

        let events = collect_until_end(&mut tail).await;
        let flushes = events
            .iter()
            .filter(|event| matches!(event, TailEvent::Flush { .. }))
            .count();
        assert_eq!(flushes, 1);
        assert!(tail.next().await.is_none());
    }

    #[tokio::test]
    async fn test_poll_next_pending_until_quit() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        tail.start().await.unwrap();

        {
            let mut next = task::spawn(tail.next());
            assert_pending!(next.poll());
        }

        tail.quit().await;

        let mut next = task::spawn(tail.next());
        let event = assert_ready!(next.poll());
        assert!(matches!(
            event,
            Some(TailEvent::Flush {
                last_read_position: 7
            })
        ));
        drop(next);

        let mut next = task::spawn(tail.next());
        assert!(assert_ready!(next.poll()).is_none());
    }

    #[tokio::test]
    async fn test_appended_lines_delivered_in_order() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        tail.start().await.unwrap();

        temp_file.append_content("LINE 2").unwrap();
        assert_eq!(next_data(&mut tail).await, b"LINE 2\n");

        temp_file.append_content("LINE 3").unwrap();
        assert_eq!(next_data(&mut tail).await, b"LINE 3\n");

        assert_eq!(tail.quit().await, 21);
    }

    #[tokio::test]
    async fn test_start_position_zero_reads_existing_content() {
        let temp_file = TempLogFile::with_content("already here").unwrap();
        let options = TailOptions {
            start_pos: Some(0),
            ..fast_options()
        };
        let mut tail = TailFile::new(temp_file.path(), options).unwrap();
        tail.start().await.unwrap();

        assert_eq!(next_data(&mut tail).await, b"already here\n");
        tail.quit().await;
    }

    #[tokio::test]
    async fn test_truncation_signal_then_data() {
        let temp_file = TempLogFile::with_content("a long line to be cut").unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        tail.start().await.unwrap();

        temp_file.truncate().unwrap();
        temp_file.append_content("cut").unwrap();

        let mut saw_truncated = false;
        loop {
            match next_event(&mut tail).await.expect("stream ended") {
                TailEvent::Truncated { filename, .. } => {
                    assert_eq!(filename, temp_file.path());
                    saw_truncated = true;
                }
                TailEvent::Data(chunk) => {
                    assert!(saw_truncated, "data arrived before the truncation signal");
                    assert_eq!(chunk.as_bytes(), b"cut\n");
                    break;
                }
                _ => {}
            }
        }
        tail.quit().await;
    }

    #[tokio::test]
    async fn test_backpressure_limits_read_ahead() {
        let temp_file = TempLogFile::new().unwrap();
        let content: Vec<u8> = (0..64u8).collect();
        temp_file.append_raw(&content).unwrap();
        let options = TailOptions {
            start_pos: Some(0),
            read_stream_opts: ReadStreamOptions {
                chunk_size: 4,
                high_water_mark: 1,
            },
            ..fast_options()
        };
        let mut tail = TailFile::new(temp_file.path(), options).unwrap();
        tail.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tail.last_read_position() <= 8);

        let mut received = Vec::new();
        while received.len() < content.len() {
            received.extend(next_data(&mut tail).await);
        }
        assert_eq!(received, content);
        tail.quit().await;
    }

    #[tokio::test]
    async fn test_fatal_failure_ends_stream() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let options = TailOptions {
            max_poll_failures: 2,
            ..fast_options()
        };
        let mut tail = TailFile::new(temp_file.path(), options).unwrap();
        tail.start().await.unwrap();
        temp_file.remove().unwrap();

        let events = collect_until_end(&mut tail).await;
        let names: Vec<_> = events.iter().map(TailEvent::name).collect();
        assert_eq!(names, vec!["retry", "error", "flush"]);

        // Quitting after the session already ended is still fine.
        assert_eq!(tail.quit().await, 7);
    }

    #[tokio::test]
    async fn test_quit_position_excludes_unfinished_character() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_raw(b"caf\xE9").unwrap();
        let options = TailOptions {
            start_pos: Some(0),
            encoding: Some(Encoding::Utf8),
            ..fast_options()
        };
        let mut tail = TailFile::new(temp_file.path(), options).unwrap();
        tail.start().await.unwrap();

        assert_eq!(next_data(&mut tail).await, b"caf");
        assert_eq!(tail.quit().await, 3);

        let events = collect_until_end(&mut tail).await;
        assert!(events.iter().all(|event| event.as_data().is_none()));
        assert!(matches!(
            events.last(),
            Some(TailEvent::Flush {
                last_read_position: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_watch_events_wake_poll_early() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let options = TailOptions {
            poll_file_interval_ms: 10_000,
            watch_events: true,
            ..Default::default()
        };
        let mut tail = TailFile::new(temp_file.path(), options).unwrap();
        tail.start().await.unwrap();

        // Give the session task time to register the watcher.
        tokio::time::sleep(Duration::from_millis(200)).await;
        temp_file.append_content("LINE 2").unwrap();

        let data = tokio::time::timeout(Duration::from_secs(3), next_data(&mut tail))
            .await
            .expect("data should arrive well before the poll interval");
        assert_eq!(data, b"LINE 2\n");
        tail.quit().await;
    }

    #[tokio::test]
    async fn test_data_adaptor_yields_chunks() {
        let temp_file = TempLogFile::with_content("LINE 1").unwrap();
        let mut tail = TailFile::new(temp_file.path(), fast_options()).unwrap();
        tail.start().await.unwrap();
        let mut data = tail.data();

        temp_file.append_content("LINE 2").unwrap();

        let chunk = tokio::time::timeout(Duration::from_secs(5), data.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(chunk.as_bytes(), b"LINE 2\n");
    }
}
