//! A file tail library that follows a growing file through renames,
//! rotation, truncation and brief disappearance.
//!
//! The file is polled on an interval rather than watched, and new bytes are
//! delivered as an async stream of [`TailEvent`]s that only reads ahead as
//! fast as the consumer pulls.
//!
//! # Example
//!
//! ```rust,no_run
//! use file_tail::{TailEvent, TailFile, TailOptions};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tail = TailFile::new("app.log", TailOptions::default())?;
//!     tail.start().await?;
//!
//!     while let Some(event) = tail.next().await {
//!         match event {
//!             TailEvent::Data(chunk) => print!("{}", String::from_utf8_lossy(chunk.as_bytes())),
//!             TailEvent::Renamed { filename, .. } => eprintln!("{} was rotated", filename.display()),
//!             TailEvent::Error(e) => eprintln!("Error: {}", e),
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod detector;
mod error;
mod event;
mod options;
mod reader;
mod session;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use error::{Error, ErrorCode, Result};
pub use event::{Chunk, TailEvent};
pub use options::{
    DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK, DEFAULT_MAX_POLL_FAILURES,
    DEFAULT_POLL_FAILURE_RETRY_MS, DEFAULT_POLL_FILE_INTERVAL_MS, Encoding, ReadStreamOptions,
    TailOptions,
};
pub use stream::TailFile;

use std::path::Path;

/// Creates and starts a tail session in one step.
///
/// # Arguments
///
/// * `path` - File path to follow
/// * `options` - Session configuration
///
/// # Example
///
/// ```rust,no_run
/// use file_tail::{tail_file, TailOptions};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut data = tail_file("app.log", TailOptions::default()).await?.data();
///
///     while let Some(chunk) = data.next().await {
///         print!("{}", String::from_utf8_lossy(chunk?.as_bytes()));
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<TailFile> {
    let mut tail = TailFile::new(path, options)?;
    tail.start().await?;
    Ok(tail)
}
