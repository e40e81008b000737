// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use snafu::Snafu;

/// Leaf error type for `fvde-codec`. Callers further up the stack wrap
/// these into `fvde_types::Error` via `ResultExt::context`, picking the
/// appropriate `ErrorKind` for the frame they're adding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CodecError {
    #[snafu(display("not a Core Storage volume header: signature {found:02x?} != \"CS\""))]
    BadSignature { found: [u8; 2] },

    #[snafu(display("buffer too short for a metadata block: need at least {needed} bytes, got {actual}"))]
    ShortBuffer { needed: usize, actual: usize },

    #[snafu(display("metadata block at {offset} has no volume groups descriptor (offset field <= 64)"))]
    NoDescriptor { offset: u32 },
}
