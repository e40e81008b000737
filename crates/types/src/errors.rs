// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

use thiserror::Error;

/// The failure-class taxonomy shared by every crate in the toolkit.
///
/// Each crate defines its own leaf error enum for the failures it can
/// actually produce, but every one of those leaf errors maps onto exactly
/// one of these kinds so that callers further up the stack (and the `check`
/// JSON report) can classify a failure without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad user input: out-of-range indices, malformed base16 keys, etc.
    InvalidArgument,
    /// A value was structurally valid but not one this toolkit supports
    /// (unknown signature, unknown keyring id, unknown processing order).
    UnsupportedValue,
    /// A `read` returned fewer bytes than requested, or the underlying OS
    /// call failed.
    IoRead,
    /// A `write` returned fewer bytes than requested, or the underlying OS
    /// call failed.
    IoWrite,
    /// A `seek` failed.
    IoSeek,
    /// Opening a source or destination failed.
    IoOpen,
    /// Closing a source or destination failed.
    IoClose,
    /// An allocation could not be satisfied.
    MemoryExhausted,
    /// A copy operation (dump) failed for a reason not otherwise covered.
    CopyFailed,
    /// The logical volume is still locked where the core requires it
    /// unlocked.
    Locked,
    /// More than 16 physical or logical volumes were requested.
    CapacityExceeded,
    /// The cooperative abort flag was observed set at a checkpoint.
    AbortRequested,
    /// A checksum did not match; report-only unless strict mode is set.
    ChecksumMismatch,
    /// An extent-store invariant was violated: overlap, allocate-after-
    /// allocate, reserved-violation, or free-after-free.
    ProvenanceViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid argument",
            Self::UnsupportedValue => "unsupported value",
            Self::IoRead => "read failed",
            Self::IoWrite => "write failed",
            Self::IoSeek => "seek failed",
            Self::IoOpen => "open failed",
            Self::IoClose => "close failed",
            Self::MemoryExhausted => "memory exhausted",
            Self::CopyFailed => "copy failed",
            Self::Locked => "volume locked",
            Self::CapacityExceeded => "capacity exceeded",
            Self::AbortRequested => "abort requested",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::ProvenanceViolation => "provenance violation",
        };
        f.write_str(s)
    }
}

/// A toolkit error: a failure kind, a message naming the frame that raised
/// it, and an optional chained source.
///
/// Every layer that wraps a lower error picks its own `ErrorKind` (which
/// may differ from the source's, e.g. a `fvde-codec` `IoRead` becoming a
/// `fvde-walker` `CopyFailed`) and prefixes its own function name onto the
/// message, building the "stack of (function, message) frames" the error
/// handling design calls for. Nothing is swallowed: `source` always points
/// at the error that caused this one, when there was one.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    /// Construct a leaf error with no further source.
    pub fn new(kind: ErrorKind, function: &'static str, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{function}: {message}"),
            source: None,
        }
    }

    /// Walk the `source()` chain, collecting one display string per frame,
    /// starting with this error's own message.
    pub fn frames(&self) -> Vec<String> {
        let mut frames = vec![self.message.clone()];
        let mut cur: Option<&(dyn std::error::Error + 'static)> =
            self.source.as_deref().map(|s| s as &(dyn std::error::Error + 'static));
        while let Some(err) = cur {
            frames.push(err.to_string());
            cur = err.source();
        }
        frames
    }
}

/// Attaches a frame (function name + message) onto a `Result`'s error,
/// wrapping it in a toolkit [`Error`] of the given [`ErrorKind`].
pub trait ResultExt<T> {
    fn context(self, kind: ErrorKind, function: &'static str, message: impl fmt::Display) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, kind: ErrorKind, function: &'static str, message: impl fmt::Display) -> Result<T, Error> {
        self.map_err(|source| Error {
            kind,
            message: format!("{function}: {message}"),
            source: Some(Box::new(source)),
        })
    }
}
