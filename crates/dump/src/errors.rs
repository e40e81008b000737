// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io;

use thiserror::Error;

/// Leaf error type for `fvde-dump`. spec.md §4.D: "read/write short-counts
/// are fatal; seek failures are fatal; all errors include offset and
/// region name. Destination is left in an undefined state on failure (no
/// rollback)."
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("destination {path} already exists (pass force to overwrite)")]
    DestinationExists { path: String },

    #[error("opening {path} failed: {source}")]
    Open { path: String, #[source] source: io::Error },

    #[error("reading region {region} at offset {offset} failed: {source}")]
    Read { region: String, offset: u64, #[source] source: io::Error },

    #[error("writing region {region} at offset {offset} failed: {source}")]
    Write { region: String, offset: u64, #[source] source: io::Error },

    #[error("seeking to offset {offset} failed: {source}")]
    Seek { offset: u64, #[source] source: io::Error },

    #[error("setting destination length failed: {0}")]
    SetLen(#[source] io::Error),

    #[error("decoding volume header or metadata block failed: {0}")]
    Codec(#[from] fvde_codec::CodecError),

    #[error("abort requested")]
    Aborted,
}
