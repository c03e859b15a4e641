//! File access primitives used by the session: open, stat, bounded reads.

use crate::detector::FileStat;
use bytes::Bytes;
use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A freshly opened handle together with a stat taken through it.
pub(crate) struct OpenedFile {
    pub file: File,
    pub stat: FileStat,
}

/// Opens `path` and stats the handle, so identity matches what was opened
/// even if the path is replaced concurrently.
pub(crate) async fn open_file(path: &Path) -> io::Result<OpenedFile> {
    let file = File::open(path).await?;
    let metadata = file.metadata().await?;
    Ok(OpenedFile {
        file,
        stat: FileStat::from(&metadata),
    })
}

/// Stats the path (not an open handle).
pub(crate) async fn stat_path(path: &Path) -> io::Result<FileStat> {
    let metadata = fs::metadata(path).await?;
    Ok(FileStat::from(&metadata))
}

/// Current size of the instance behind an open handle.
pub(crate) async fn handle_size(file: &File) -> io::Result<u64> {
    Ok(file.metadata().await?.len())
}

/// Reads the next chunk of `[position, end)`, at most `chunk_size` bytes.
///
/// Returns `None` when the range is exhausted or the file ended early.
pub(crate) async fn read_chunk(
    file: &mut File,
    position: u64,
    end: u64,
    chunk_size: usize,
) -> io::Result<Option<Bytes>> {
    let Some(remaining) = end.checked_sub(position).filter(|n| *n > 0) else {
        return Ok(None);
    };
    let want = remaining.min(chunk_size as u64);

    file.seek(SeekFrom::Start(position)).await?;

    let mut buf = Vec::with_capacity(want as usize);
    (&mut *file).take(want).read_to_end(&mut buf).await?;

    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(Bytes::from(buf)))
}
