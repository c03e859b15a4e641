//! Change classification for the poll loop.
//!
//! Each poll compares a fresh stat of the path against what the session
//! last saw. The decision is a pure function so every branch can be tested
//! without touching the filesystem.

use std::fs::Metadata;

/// Opaque token naming one file instance. It survives renames and changes
/// when a file is deleted and recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct FileIdentity {
    device: u64,
    inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub(crate) fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    /// Stable Rust exposes neither the volume serial number nor the file
    /// index here, so Windows falls back to the creation time. A file
    /// replaced by another created in the same 100ns tick is not seen as a
    /// rotation.
    #[cfg(windows)]
    pub(crate) fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::windows::fs::MetadataExt;
        Self {
            device: 0,
            inode: metadata.creation_time(),
        }
    }

    #[cfg(not(any(unix, windows)))]
    pub(crate) fn from_metadata(_metadata: &Metadata) -> Self {
        Self {
            device: 0,
            inode: 0,
        }
    }
}

/// Identity and size captured by one stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileStat {
    pub identity: FileIdentity,
    pub size: u64,
}

impl From<&Metadata> for FileStat {
    fn from(metadata: &Metadata) -> Self {
        Self {
            identity: FileIdentity::from_metadata(metadata),
            size: metadata.len(),
        }
    }
}

/// What happened to the followed path since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    /// The path names a different file instance.
    Rotated,
    /// Same file, now shorter than the read position.
    Truncated,
    /// Same file with `[from, to)` newly available.
    Grew { from: u64, to: u64 },
    Unchanged,
}

/// Classifies a successful stat against the session's view of the file.
///
/// `awaiting_start` is set while an explicit start offset lies beyond the
/// end of the file; a short file then means "not there yet" rather than
/// truncation.
pub(crate) fn classify(
    current: Option<FileIdentity>,
    position: u64,
    awaiting_start: bool,
    stat: FileStat,
) -> Change {
    if current != Some(stat.identity) {
        return Change::Rotated;
    }

    if detect_file_truncation(stat.size, position) {
        return if awaiting_start {
            Change::Unchanged
        } else {
            Change::Truncated
        };
    }

    match calculate_bytes_to_read(stat.size, position) {
        Some(_) => Change::Grew {
            from: position,
            to: stat.size,
        },
        None => Change::Unchanged,
    }
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Calculate bytes to read based on current size and last position
fn calculate_bytes_to_read(current_size: u64, last_position: u64) -> Option<u64> {
    if current_size <= last_position {
        None
    } else {
        Some(current_size - last_position)
    }
}
