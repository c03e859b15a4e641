//! Optional OS wake-ups for the poll loop, using the notify crate.
//!
//! The watcher never decides anything about the file. It only cuts the
//! steady-state wait short so the next poll runs sooner.

use crate::error::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

/// Watches the directory containing a file and signals activity on it.
pub(crate) struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::Receiver<()>,
    file_path: PathBuf,
}

impl FileWatcher {
    /// Creates a new file watcher for the specified path.
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        // Capacity 1: a wake-up already queued covers any that follow.
        let (tx, rx) = mpsc::channel(1);

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_event_relevant_to_file(&event, &file_name) => {
                    let _ = tx.try_send(());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "file watcher reported an error"),
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            file_path,
        })
    }

    /// Starts watching the parent directory, so renames and re-creations
    /// of the file are seen too.
    pub(crate) fn start_watching(&mut self) -> Result<()> {
        let watch_path = match self.file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        self.watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Resolves on the next relevant filesystem event.
    pub(crate) async fn wait(&mut self) -> Option<()> {
        self.receiver.recv().await
    }

    #[cfg(test)]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
