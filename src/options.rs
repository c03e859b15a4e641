//! Session configuration and construction-time validation.

use crate::error::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_POLL_FILE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POLL_FAILURE_RETRY_MS: u64 = 200;
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 10;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_HIGH_WATER_MARK: usize = 16;

/// Text encoding applied to data chunks before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[serde(alias = "utf-8")]
    Utf8,
    #[serde(alias = "latin-1", alias = "binary")]
    Latin1,
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "latin1" | "latin-1" | "binary" => Ok(Encoding::Latin1),
            other => Err(format!("unsupported encoding '{}'", other)),
        }
    }
}

/// Options passed through to the read primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStreamOptions {
    /// Upper bound on the bytes pulled from the file by a single read.
    pub chunk_size: usize,
    /// Events the output buffer holds before the producer suspends.
    pub high_water_mark: usize,
}

impl Default for ReadStreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Configuration for a tail session. Immutable once the session is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    /// Deliver data as text in this encoding instead of raw bytes.
    pub encoding: Option<Encoding>,
    /// Steady-state delay between polls.
    pub poll_file_interval_ms: u64,
    /// Delay between polls while the file is missing.
    pub poll_failure_retry_ms: u64,
    /// Consecutive missing-file polls that end the session.
    pub max_poll_failures: u32,
    /// Offset of the first byte to deliver. `None` starts at end of file.
    pub start_pos: Option<i64>,
    pub read_stream_opts: ReadStreamOptions,
    /// Also poll early when the OS reports activity in the file's directory.
    pub watch_events: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            encoding: None,
            poll_file_interval_ms: DEFAULT_POLL_FILE_INTERVAL_MS,
            poll_failure_retry_ms: DEFAULT_POLL_FAILURE_RETRY_MS,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
            start_pos: None,
            read_stream_opts: ReadStreamOptions::default(),
            watch_events: false,
        }
    }
}

impl TailOptions {
    /// Parses a JSON options object, e.g. `{"pollFileIntervalMs": 500}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    /// Builds options from an already parsed JSON object.
    ///
    /// Missing or `null` fields keep their defaults and unknown keys are
    /// ignored. A field of the wrong type fails with that field's code.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| config_error("options must be a JSON object"))?;
        let mut options = TailOptions::default();

        if let Some(encoding) = non_null(map, "encoding") {
            options.encoding = Some(serde_json::from_value(encoding.clone())?);
        }
        if let Some(ms) = integer_field(map, "pollFileIntervalMs", ErrorCode::PollInterval)? {
            options.poll_file_interval_ms = ms;
        }
        if let Some(ms) = integer_field(map, "pollFailureRetryMs", ErrorCode::PollRetry)? {
            options.poll_failure_retry_ms = ms;
        }
        if let Some(max) = integer_field(map, "maxPollFailures", ErrorCode::MaxPollFailures)? {
            options.max_poll_failures = u32::try_from(max).map_err(|_| {
                Error::invalid(ErrorCode::MaxPollFailures, "maxPollFailures is too large")
            })?;
        }
        if let Some(pos) = integer_field(map, "startPos", ErrorCode::StartPos)? {
            options.start_pos = Some(
                i64::try_from(pos)
                    .map_err(|_| Error::invalid(ErrorCode::StartPos, "startPos is too large"))?,
            );
        }
        if let Some(opts) = non_null(map, "readStreamOpts") {
            options.read_stream_opts = read_stream_options(opts)?;
        }
        if let Some(watch) = non_null(map, "watchEvents") {
            options.watch_events = watch
                .as_bool()
                .ok_or_else(|| config_error("watchEvents must be a boolean"))?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Checks every option, returning the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.poll_file_interval_ms == 0 {
            return Err(Error::invalid(
                ErrorCode::PollInterval,
                "pollFileIntervalMs must be a positive integer",
            ));
        }
        if self.poll_failure_retry_ms == 0 {
            return Err(Error::invalid(
                ErrorCode::PollRetry,
                "pollFailureRetryMs must be a positive integer",
            ));
        }
        if self.max_poll_failures == 0 {
            return Err(Error::invalid(
                ErrorCode::MaxPollFailures,
                "maxPollFailures must be a positive integer",
            ));
        }
        if self.read_stream_opts.chunk_size == 0 || self.read_stream_opts.high_water_mark == 0 {
            return Err(Error::invalid(
                ErrorCode::ReadStreamOpts,
                "readStreamOpts chunkSize and highWaterMark must be positive",
            ));
        }
        if let Some(pos) = self.start_pos {
            if pos < 0 {
                return Err(Error::invalid(
                    ErrorCode::StartPos,
                    format!("startPos must be a non-negative integer, got {}", pos),
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_file_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.poll_failure_retry_ms)
    }

    /// The validated start offset, if one was given.
    pub(crate) fn start_offset(&self) -> Option<u64> {
        self.start_pos.and_then(|pos| u64::try_from(pos).ok())
    }
}

/// Rejects an empty file name.
pub(crate) fn validate_filename(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::invalid(
            ErrorCode::Filename,
            "filename must be a non-empty path",
        ));
    }
    Ok(())
}

fn non_null<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn integer_field(map: &Map<String, Value>, key: &str, code: ErrorCode) -> Result<Option<u64>> {
    match non_null(map, key) {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            Error::invalid(
                code,
                format!("{} must be a non-negative integer, got {}", key, value),
            )
        }),
    }
}

fn read_stream_options(value: &Value) -> Result<ReadStreamOptions> {
    let map = value.as_object().ok_or_else(|| {
        Error::invalid(ErrorCode::ReadStreamOpts, "readStreamOpts must be an object")
    })?;
    let mut opts = ReadStreamOptions::default();

    for (key, target) in [
        ("chunkSize", &mut opts.chunk_size),
        ("highWaterMark", &mut opts.high_water_mark),
    ] {
        if let Some(size) = integer_field(map, key, ErrorCode::ReadStreamOpts)? {
            *target = usize::try_from(size).map_err(|_| {
                Error::invalid(ErrorCode::ReadStreamOpts, format!("{} is too large", key))
            })?;
        }
    }

    Ok(opts)
}

fn config_error(message: &str) -> Error {
    Error::Config(<serde_json::Error as serde::de::Error>::custom(message))
}
