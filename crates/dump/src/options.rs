// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

/// Block-aligned I/O unit for the copy loop (spec.md §4.D).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Which of the two destination layouts to produce (spec.md §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    /// Destination truncated to `physical_volume_size`; regions copied to
    /// their original byte offsets, relying on filesystem sparseness.
    Sparse,
    /// Regions repacked contiguously starting at byte 0; offsets and
    /// checksums inside the copied metadata are rewritten to match.
    Compact,
}

/// Options accepted by [`crate::dump`].
#[derive(Debug, Clone, Copy)]
pub struct DumpOptions {
    pub mode: DumpMode,
    /// Overwrite an existing destination file instead of failing.
    pub force: bool,
    /// `-b`: pick the metadata copy with the highest `transaction_identifier`
    /// for descriptor extraction, instead of always using the first copy.
    pub best_metadata: bool,
    /// `--sample-bytes`: in sparse mode, additionally copy this many bytes
    /// of encrypted data starting just past the encrypted-metadata regions
    /// (spec.md §1's "optional sample of encrypted data").
    pub sample_bytes: Option<u64>,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self { mode: DumpMode::Sparse, force: false, best_metadata: false, sample_bytes: None }
    }
}

/// One region copied (and, in compact mode, possibly rewritten) during a dump.
#[derive(Debug, Clone)]
pub struct DumpRegion {
    pub name: String,
    pub source_offset: u64,
    pub dest_offset: u64,
    pub len: u64,
}

/// The outcome of one [`crate::dump`] call.
#[derive(Debug, Clone)]
pub struct DumpReport {
    pub mode: DumpMode,
    pub bytes_written: u64,
    pub regions: Vec<DumpRegion>,
}
