// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `fvde dump`: produce a sparse or compact image via `fvde_dump::dump`.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use fvde_codec::VOLUME_HEADER_LEN;
use fvde_dump::{dump, DumpMode, DumpOptions};
use fvde_types::AbortFlag;

use crate::args::DumpArgs;
use crate::errors::CliError;

pub fn run(args: &DumpArgs, abort: &AbortFlag) -> Result<(), CliError> {
    let mut source = File::open(&args.source)?;
    source.seek(SeekFrom::Start(args.offset))?;

    let mut header_bytes = [0u8; VOLUME_HEADER_LEN];
    source.read_exact(&mut header_bytes)?;
    source.seek(SeekFrom::Start(args.offset))?;

    // `dump` reads regions relative to the volume's own byte 0; when the
    // source is partitioned (`--offset` non-zero) present it a windowed
    // view instead of rewinding the shared handle.
    let mut windowed = OffsetReader { inner: source, base: args.offset };

    let options = DumpOptions {
        mode: if args.compact { DumpMode::Compact } else { DumpMode::Sparse },
        force: args.force,
        best_metadata: args.best_metadata,
        sample_bytes: args.sample_bytes,
    };

    let report = dump(&mut windowed, &header_bytes, &args.destination, &options, abort)?;

    log::info!("wrote {} bytes across {} regions to {}", report.bytes_written, report.regions.len(), args.destination.display());
    for region in &report.regions {
        log::debug!(
            "region {:?}: source {}..{} -> dest {}..{}",
            region.name,
            region.source_offset,
            region.source_offset + region.len,
            region.dest_offset,
            region.dest_offset + region.len
        );
    }

    Ok(())
}

/// Presents `inner` as if it started at `base`, so `fvde_dump::dump`'s
/// absolute byte offsets (spec.md §4.D, computed against the volume's own
/// byte 0) land at `base + offset` in the real, possibly-partitioned source.
struct OffsetReader {
    inner: File,
    base: u64,
}

impl Read for OffsetReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for OffsetReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let absolute = match pos {
            SeekFrom::Start(offset) => SeekFrom::Start(self.base + offset),
            other => other,
        };
        let result = self.inner.seek(absolute)?;
        Ok(result.saturating_sub(self.base))
    }
}
