//! Events emitted by a tail session and the chunk decoder feeding them.

use crate::error::Error;
use crate::options::Encoding;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A piece of file content, raw or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Bytes(Bytes),
    Text(String),
}

impl Chunk {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Bytes(bytes) => bytes.as_ref(),
            Chunk::Text(text) => text.as_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Bytes(bytes) => bytes,
            Chunk::Text(text) => Bytes::from(text),
        }
    }
}

/// Everything a tail session reports, in delivery order.
///
/// The sequence ends (the stream yields `None`) right after a final
/// [`TailEvent::Flush`].
#[derive(Debug)]
pub enum TailEvent {
    /// Newly appended content.
    Data(Chunk),
    /// Everything known as of the last poll has been delivered.
    Flush { last_read_position: u64 },
    /// The path now refers to a different file; reading restarted at 0.
    Renamed {
        filename: PathBuf,
        when: DateTime<Utc>,
    },
    /// The file shrank below the read position; reading restarted at 0.
    Truncated {
        filename: PathBuf,
        when: DateTime<Utc>,
    },
    /// The file was missing; another poll is scheduled at the retry cadence.
    Retry {
        filename: PathBuf,
        attempts: u32,
        when: DateTime<Utc>,
    },
    /// A read failed. The session keeps polling and may recover.
    ReadError(Error),
    /// The session failed and will end.
    Error(Error),
}

impl TailEvent {
    /// Short event name, handy for logging.
    pub fn name(&self) -> &'static str {
        match self {
            TailEvent::Data(_) => "data",
            TailEvent::Flush { .. } => "flush",
            TailEvent::Renamed { .. } => "renamed",
            TailEvent::Truncated { .. } => "truncated",
            TailEvent::Retry { .. } => "retry",
            TailEvent::ReadError(_) => "read_error",
            TailEvent::Error(_) => "error",
        }
    }

    pub fn as_data(&self) -> Option<&Chunk> {
        match self {
            TailEvent::Data(chunk) => Some(chunk),
            _ => None,
        }
    }
}

/// Turns raw reads into chunks, holding back UTF-8 sequences cut by a read
/// boundary until the rest arrives.
#[derive(Debug)]
pub(crate) struct Decoder {
    encoding: Option<Encoding>,
    pending: Vec<u8>,
}

impl Decoder {
    pub(crate) fn new(encoding: Option<Encoding>) -> Self {
        Self {
            encoding,
            pending: Vec::new(),
        }
    }

    /// Returns `None` when every byte is still held back.
    pub(crate) fn decode(&mut self, bytes: Bytes) -> Option<Chunk> {
        let chunk = match self.encoding {
            None => Chunk::Bytes(bytes),
            Some(Encoding::Latin1) => Chunk::Text(bytes.iter().map(|&b| b as char).collect()),
            Some(Encoding::Utf8) => {
                self.pending.extend_from_slice(&bytes);
                let complete = self.pending.len() - incomplete_suffix_len(&self.pending);
                let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
                self.pending.drain(..complete);
                Chunk::Text(text)
            }
        };

        (!chunk.is_empty()).then_some(chunk)
    }

    /// Bytes held back waiting for the rest of a UTF-8 sequence.
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops the carry when the source file changes, returning it lossily.
    pub(crate) fn reset(&mut self) -> Option<Chunk> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(Chunk::Text(text))
    }
}

/// Length of a trailing UTF-8 sequence that needs more bytes to complete.
fn incomplete_suffix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(3) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF8..=0xFF => 0,
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
