// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;

use thiserror::Error;

/// Leaf error type for `fvde-walker`.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("the Unlocker reported no physical volumes")]
    NoPhysicalVolumes,

    #[error("opening physical volume source failed: {0}")]
    Open(#[source] io::Error),

    #[error("reading from physical volume source failed: {0}")]
    Read(#[source] io::Error),

    #[error("seeking in physical volume source failed: {0}")]
    Seek(#[source] io::Error),

    #[error("decoding volume header or metadata block failed: {0}")]
    Codec(#[from] fvde_codec::CodecError),

    #[error("extent store rejected an operation: {0}")]
    Store(#[from] fvde_store::StoreError),

    #[error("abort requested")]
    Aborted,
}
