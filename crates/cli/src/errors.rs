// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;

use fvde_types::ErrorKind;
use thiserror::Error;

/// Leaf error type for the `fvde` binary. Wraps every lower-crate error via
/// `#[from]` so a single `match` in `main` can print a frame trace and pick
/// an exit code; each variant maps onto one `fvde_types::ErrorKind` via
/// [`CliError::kind`].
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0} is locked and no usable credentials were supplied")]
    Locked(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] fvde_codec::CodecError),

    #[error(transparent)]
    Store(#[from] fvde_store::StoreError),

    #[error(transparent)]
    Walk(#[from] fvde_walker::WalkError),

    #[error(transparent)]
    Dump(#[from] fvde_dump::DumpError),

    #[error("keyring operation failed: {0}")]
    Keyring(String),

    #[error("abort requested")]
    Aborted,
}

impl CliError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Unsupported(_) => ErrorKind::UnsupportedValue,
            Self::Locked(_) => ErrorKind::Locked,
            Self::Io(_) => ErrorKind::IoRead,
            Self::Codec(_) => ErrorKind::UnsupportedValue,
            Self::Store(_) => ErrorKind::InvalidArgument,
            Self::Walk(fvde_walker::WalkError::Aborted) => ErrorKind::AbortRequested,
            Self::Walk(_) => ErrorKind::CopyFailed,
            Self::Dump(fvde_dump::DumpError::Aborted) => ErrorKind::AbortRequested,
            Self::Dump(_) => ErrorKind::CopyFailed,
            Self::Keyring(_) => ErrorKind::UnsupportedValue,
            Self::Aborted => ErrorKind::AbortRequested,
        }
    }

    /// Walk the `source()` chain into one display string per frame, for
    /// `-v` diagnostics (spec.md §7's "stack of (function, message) frames").
    pub fn frames(&self) -> Vec<String> {
        let mut frames = vec![self.to_string()];
        let mut cur: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self);
        while let Some(err) = cur {
            frames.push(err.to_string());
            cur = err.source();
        }
        frames
    }
}
