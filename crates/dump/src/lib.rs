// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Compact and sparse image rewriter for Core Storage / FVDE volumes
//! (spec.md §4.D).
//!
//! Given an opened, read-only source and the already-decoded volume
//! header bytes, copies the structurally significant regions (header,
//! four metadata-block copies, two encrypted-metadata regions) into a
//! destination file, either at their original byte offsets (sparse mode)
//! or repacked contiguously from byte 0 with offsets and checksums
//! rewritten in place (compact mode).

mod errors;
mod options;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fvde_codec::{
    decode_metadata_block_header, decode_volume_header, encode_volume_header, locate_encrypted_metadata, rewrite_metadata_block,
    VolumeHeader, VOLUME_HEADER_LEN,
};
use fvde_types::AbortFlag;

pub use errors::DumpError;
pub use options::{DumpMode, DumpOptions, DumpRegion, DumpReport, CHUNK_SIZE};

/// Copy `len` bytes from `source` at `source_offset` to `dest` at
/// `dest_offset`, `CHUNK_SIZE` at a time, polling `abort` once per chunk.
fn copy_region(
    source: &mut (impl Read + Seek),
    dest: &mut File,
    region: &str,
    source_offset: u64,
    dest_offset: u64,
    len: u64,
    abort: &AbortFlag,
) -> Result<(), DumpError> {
    source.seek(SeekFrom::Start(source_offset)).map_err(|source| DumpError::Seek { offset: source_offset, source })?;
    dest.seek(SeekFrom::Start(dest_offset)).map_err(|source| DumpError::Seek { offset: dest_offset, source })?;

    let mut remaining = len;
    let mut buf = vec![0u8; CHUNK_SIZE];
    while remaining > 0 {
        if abort.is_set() {
            log::info!("abort requested while copying region {region:?}");
            return Err(DumpError::Aborted);
        }
        let chunk_len = remaining.min(CHUNK_SIZE as u64) as usize;
        let chunk = &mut buf[..chunk_len];
        source
            .read_exact(chunk)
            .map_err(|source| DumpError::Read { region: region.to_string(), offset: source_offset + (len - remaining), source })?;
        dest.write_all(chunk)
            .map_err(|source| DumpError::Write { region: region.to_string(), offset: dest_offset + (len - remaining), source })?;
        remaining -= chunk_len as u64;
    }
    Ok(())
}

/// Read `len` bytes from `source` at `offset` into an owned buffer,
/// without touching the destination — used for the header/metadata
/// regions this function must mutate before writing out.
fn read_region(source: &mut (impl Read + Seek), region: &str, offset: u64, len: usize) -> Result<Vec<u8>, DumpError> {
    source.seek(SeekFrom::Start(offset)).map_err(|source| DumpError::Seek { offset, source })?;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).map_err(|source| DumpError::Read { region: region.to_string(), offset, source })?;
    Ok(buf)
}

fn write_region(dest: &mut File, region: &str, offset: u64, bytes: &[u8]) -> Result<(), DumpError> {
    dest.seek(SeekFrom::Start(offset)).map_err(|source| DumpError::Seek { offset, source })?;
    dest.write_all(bytes).map_err(|source| DumpError::Write { region: region.to_string(), offset, source })
}

/// Select the metadata copy to read the encrypted-metadata descriptor
/// from: the one with the highest `transaction_identifier` when
/// `select_best` is set, otherwise always copy 0 (spec.md §4.D).
fn select_descriptor_copy(copies: &[Vec<u8>], select_best: bool) -> usize {
    if !select_best {
        return 0;
    }
    copies
        .iter()
        .enumerate()
        .max_by_key(|(_, block)| decode_metadata_block_header(block).map(|h| h.transaction_identifier).unwrap_or(0))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Produce a dump of `source` at `dest_path` per `options` (spec.md §4.D,
/// §6.5). `header_bytes` must be the already-read 512-byte volume header
/// of `source` (callers typically got it by decoding byte 0 themselves to
/// validate the signature before committing to a dump).
pub fn dump(
    source: &mut (impl Read + Seek),
    header_bytes: &[u8; VOLUME_HEADER_LEN],
    dest_path: &Path,
    options: &DumpOptions,
    abort: &AbortFlag,
) -> Result<DumpReport, DumpError> {
    if dest_path.exists() && !options.force {
        return Err(DumpError::DestinationExists { path: dest_path.display().to_string() });
    }

    let header = decode_volume_header(header_bytes)?;
    let mut dest = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest_path)
        .map_err(|source| DumpError::Open { path: dest_path.display().to_string(), source })?;

    log::info!("dumping {:?} to {} in {:?} mode", header.block_size, dest_path.display(), options.mode);

    let report = match options.mode {
        DumpMode::Sparse => dump_sparse(source, &header, &mut dest, options, abort),
        DumpMode::Compact => dump_compact(source, &header, &mut dest, options, abort),
    }?;

    log::debug!("dump wrote {} bytes across {} region(s)", report.bytes_written, report.regions.len());
    Ok(report)
}

fn dump_sparse(
    source: &mut (impl Read + Seek),
    header: &VolumeHeader,
    dest: &mut File,
    options: &DumpOptions,
    abort: &AbortFlag,
) -> Result<DumpReport, DumpError> {
    dest.set_len(header.physical_volume_size).map_err(DumpError::SetLen)?;

    let mut regions = Vec::new();
    let mut bytes_written = 0u64;

    copy_region(source, dest, "volume header", 0, 0, VOLUME_HEADER_LEN as u64, abort)?;
    regions.push(DumpRegion { name: "volume header".to_string(), source_offset: 0, dest_offset: 0, len: VOLUME_HEADER_LEN as u64 });
    bytes_written += VOLUME_HEADER_LEN as u64;

    let metadata_size = header.metadata_size as u64;
    let mut metadata_copies = Vec::with_capacity(4);
    for (i, &offset) in header.metadata_offsets().iter().enumerate() {
        copy_region(source, dest, "metadata block", offset, offset, metadata_size, abort)?;
        regions.push(DumpRegion {
            name: format!("metadata block {i}"),
            source_offset: offset,
            dest_offset: offset,
            len: metadata_size,
        });
        bytes_written += metadata_size;
        metadata_copies.push(read_region(source, "metadata block", offset, header.metadata_size as usize)?);
    }

    let selected = select_descriptor_copy(&metadata_copies, options.best_metadata);
    log::debug!("selected metadata copy {selected} for encrypted-metadata location (best_metadata={})", options.best_metadata);
    if let Some(location) = locate_encrypted_metadata(&metadata_copies[selected], header.block_size)? {
        for (n, offset) in [(1, location.enc_md_1_byte_offset), (2, location.enc_md_2_byte_offset)] {
            if offset == 0 || location.enc_md_size_bytes == 0 {
                continue;
            }
            copy_region(source, dest, "encrypted metadata", offset, offset, location.enc_md_size_bytes, abort)?;
            regions.push(DumpRegion {
                name: format!("encrypted metadata {n}"),
                source_offset: offset,
                dest_offset: offset,
                len: location.enc_md_size_bytes,
            });
            bytes_written += location.enc_md_size_bytes;
        }

        if let Some(sample_bytes) = options.sample_bytes {
            let data_offset = location.enc_md_2_byte_offset.max(location.enc_md_1_byte_offset) + location.enc_md_size_bytes;
            let len = sample_bytes.min(header.physical_volume_size.saturating_sub(data_offset));
            if len > 0 {
                copy_region(source, dest, "encrypted data sample", data_offset, data_offset, len, abort)?;
                regions.push(DumpRegion {
                    name: "encrypted data sample".to_string(),
                    source_offset: data_offset,
                    dest_offset: data_offset,
                    len,
                });
                bytes_written += len;
            }
        }
    }

    Ok(DumpReport { mode: DumpMode::Sparse, bytes_written, regions })
}

fn dump_compact(
    source: &mut (impl Read + Seek),
    header: &VolumeHeader,
    dest: &mut File,
    options: &DumpOptions,
    abort: &AbortFlag,
) -> Result<DumpReport, DumpError> {
    let mut regions = Vec::new();
    let block_size = header.block_size as u64;
    let metadata_size = header.metadata_size as u64;
    let metadata_blocks_per_slot = (metadata_size / block_size).max(1);

    // Layout: [0..512) header, [block_size .. block_size + 4*metadata_size) four
    // metadata copies, then the two encrypted-metadata regions (spec.md §4.D).
    let mut header_bytes = read_region(source, "volume header", 0, VOLUME_HEADER_LEN)?;
    let metadata_dest_base = block_size;

    let new_metadata_block_numbers: [u64; 4] =
        std::array::from_fn(|i| 1 + i as u64 * metadata_blocks_per_slot);

    let mut metadata_copies = Vec::with_capacity(4);
    for &source_offset in header.metadata_offsets().iter() {
        metadata_copies.push(read_region(source, "metadata block", source_offset, metadata_size as usize)?);
    }

    let selected = select_descriptor_copy(&metadata_copies, options.best_metadata);
    log::debug!("selected metadata copy {selected} as the descriptor source for compact repacking");
    let location = locate_encrypted_metadata(&metadata_copies[selected], header.block_size)?;

    let enc_md_1_dest_offset = metadata_dest_base + 4 * metadata_size;
    let enc_md_size_bytes = location.map(|l| l.enc_md_size_bytes).unwrap_or(0);
    let enc_md_2_dest_offset = enc_md_1_dest_offset + enc_md_size_bytes;
    let enc_md_1_dest_block = enc_md_1_dest_offset / block_size;
    let enc_md_2_dest_block = enc_md_2_dest_offset / block_size;

    if let Some(location) = location {
        if location.enc_md_size_bytes > 0 {
            for block in metadata_copies.iter_mut() {
                if locate_encrypted_metadata(block, header.block_size)?.is_some() {
                    rewrite_metadata_block(block, enc_md_1_dest_block, enc_md_2_dest_block)?;
                }
            }
        }
    }

    encode_volume_header(&mut header_bytes, new_metadata_block_numbers);

    let header_bytes: [u8; VOLUME_HEADER_LEN] = header_bytes.try_into().expect("read_region returned VOLUME_HEADER_LEN bytes");
    write_region(dest, "volume header", 0, &header_bytes)?;
    regions.push(DumpRegion { name: "volume header".to_string(), source_offset: 0, dest_offset: 0, len: VOLUME_HEADER_LEN as u64 });
    let mut bytes_written = VOLUME_HEADER_LEN as u64;

    for (i, ((block, &source_offset), &dest_block_number)) in
        metadata_copies.iter().zip(header.metadata_offsets().iter()).zip(new_metadata_block_numbers.iter()).enumerate()
    {
        if abort.is_set() {
            log::info!("abort requested while writing metadata block {i}");
            return Err(DumpError::Aborted);
        }
        let dest_offset = dest_block_number * block_size;
        write_region(dest, "metadata block", dest_offset, block)?;
        regions.push(DumpRegion { name: format!("metadata block {i}"), source_offset, dest_offset, len: metadata_size });
        bytes_written += metadata_size;
    }

    if let Some(location) = location {
        if location.enc_md_size_bytes > 0 {
            for (n, (source_offset, dest_offset)) in
                [(location.enc_md_1_byte_offset, enc_md_1_dest_offset), (location.enc_md_2_byte_offset, enc_md_2_dest_offset)]
                    .into_iter()
                    .enumerate()
            {
                if source_offset == 0 {
                    continue;
                }
                copy_region(source, dest, "encrypted metadata", source_offset, dest_offset, location.enc_md_size_bytes, abort)?;
                regions.push(DumpRegion {
                    name: format!("encrypted metadata {}", n + 1),
                    source_offset,
                    dest_offset,
                    len: location.enc_md_size_bytes,
                });
                bytes_written += location.enc_md_size_bytes;
            }
        }
    }

    Ok(DumpReport { mode: DumpMode::Compact, bytes_written, regions })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use fvde_codec::WeakCrc32;
    use test_log::test;

    use super::*;

    const BLOCK_SIZE: u32 = 4096;
    const METADATA_SIZE: u64 = 8192;
    const ENC_MD_SIZE_BLOCKS: u64 = 4; // 16384 bytes

    fn checksum(bytes: &mut [u8], initial_offset: usize, checksum_offset: usize, region_start: usize) {
        let initial = u32::from_le_bytes(bytes[initial_offset..initial_offset + 4].try_into().unwrap());
        let computed = WeakCrc32::compute(initial, &bytes[region_start..]);
        bytes[checksum_offset..checksum_offset + 4].copy_from_slice(&computed.to_le_bytes());
    }

    /// Build the S4 scenario fixture: metadata offsets [0x2000, 0x4000,
    /// 0x6000, 0x8000], enc md 1 at block 100, enc md 2 at block 200.
    fn build_s4_fixture() -> (Vec<u8>, [u8; VOLUME_HEADER_LEN]) {
        let metadata_offsets = [0x2000u64, 0x4000, 0x6000, 0x8000];
        let metadata_block_numbers: Vec<u64> = metadata_offsets.iter().map(|&o| o / BLOCK_SIZE as u64).collect();
        let physical_volume_size = 0x8000 + METADATA_SIZE + (201 + ENC_MD_SIZE_BLOCKS) * BLOCK_SIZE as u64;

        let mut header = [0u8; VOLUME_HEADER_LEN];
        header[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        header[72..80].copy_from_slice(&physical_volume_size.to_le_bytes());
        header[88..90].copy_from_slice(b"CS");
        header[96..100].copy_from_slice(&BLOCK_SIZE.to_le_bytes());
        header[100..104].copy_from_slice(&(METADATA_SIZE as u32).to_le_bytes());
        encode_volume_header(&mut header, metadata_block_numbers.clone().try_into().unwrap());

        let mut image = vec![0u8; physical_volume_size as usize];
        image[..VOLUME_HEADER_LEN].copy_from_slice(&header);

        for (i, &offset) in metadata_offsets.iter().enumerate() {
            let mut block = vec![0u8; METADATA_SIZE as usize];
            block[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
            block[16..24].copy_from_slice(&(i as u64 + 1).to_le_bytes()); // ascending transaction ids
            block[220..224].copy_from_slice(&128u32.to_le_bytes());
            block[128 + 8..128 + 16].copy_from_slice(&ENC_MD_SIZE_BLOCKS.to_le_bytes());
            block[128 + 32..128 + 40].copy_from_slice(&100u64.to_le_bytes());
            block[128 + 40..128 + 48].copy_from_slice(&200u64.to_le_bytes());
            checksum(&mut block, 4, 0, 8);
            image[offset as usize..offset as usize + METADATA_SIZE as usize].copy_from_slice(&block);
        }

        (image, header)
    }

    #[test]
    fn s4_compact_dump_layout_and_checksums() {
        let (image, header_bytes) = build_s4_fixture();
        let mut source = Cursor::new(image);

        let dir = std::env::temp_dir().join(format!("fvde-dump-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest_path = dir.join("s4-compact.img");
        let _ = std::fs::remove_file(&dest_path);

        let options = DumpOptions { mode: DumpMode::Compact, force: true, best_metadata: false, sample_bytes: None };
        let report = dump(&mut source, &header_bytes, &dest_path, &options, &fvde_types::AbortFlag::new()).unwrap();

        assert_eq!(report.bytes_written, 4096 + 4 * 8192 + 2 * 16384);

        let out = std::fs::read(&dest_path).unwrap();
        assert_eq!(out.len(), 69632);

        let out_header: [u8; VOLUME_HEADER_LEN] = out[..VOLUME_HEADER_LEN].try_into().unwrap();
        assert!(fvde_codec::verify_volume_header_checksum(&out_header));
        let decoded = decode_volume_header(&out_header).unwrap();
        assert_eq!(decoded.metadata_block_numbers, [1, 3, 5, 7]);

        for i in 0..4 {
            let offset = (1 + i * 2) as usize * BLOCK_SIZE as usize;
            let block = &out[offset..offset + METADATA_SIZE as usize];
            assert!(fvde_codec::verify_metadata_block_checksum(block));
            let loc = locate_encrypted_metadata(block, BLOCK_SIZE).unwrap().unwrap();
            assert_eq!(loc.enc_md_1_byte_offset / BLOCK_SIZE as u64, 9);
            assert_eq!(loc.enc_md_2_byte_offset / BLOCK_SIZE as u64, 13);
        }

        std::fs::remove_file(&dest_path).ok();
    }

    #[test]
    fn sparse_dump_preserves_original_offsets() {
        let (image, header_bytes) = build_s4_fixture();
        let expected_len = image.len() as u64;
        let mut source = Cursor::new(image);

        let dir = std::env::temp_dir().join(format!("fvde-dump-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest_path = dir.join("s4-sparse.img");
        let _ = std::fs::remove_file(&dest_path);

        let options = DumpOptions { mode: DumpMode::Sparse, force: true, best_metadata: false, sample_bytes: None };
        dump(&mut source, &header_bytes, &dest_path, &options, &fvde_types::AbortFlag::new()).unwrap();

        let out = std::fs::read(&dest_path).unwrap();
        assert_eq!(out.len(), expected_len as usize);

        let out_header: [u8; VOLUME_HEADER_LEN] = out[..VOLUME_HEADER_LEN].try_into().unwrap();
        assert!(fvde_codec::verify_volume_header_checksum(&out_header));

        let metadata_block = &out[0x2000..0x2000 + METADATA_SIZE as usize];
        assert!(fvde_codec::verify_metadata_block_checksum(metadata_block));

        std::fs::remove_file(&dest_path).ok();
    }

    #[test]
    fn existing_destination_without_force_fails() {
        let (image, header_bytes) = build_s4_fixture();
        let mut source = Cursor::new(image);

        let dir = std::env::temp_dir().join(format!("fvde-dump-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest_path = dir.join("s4-exists.img");
        std::fs::write(&dest_path, b"existing").unwrap();

        let options = DumpOptions { mode: DumpMode::Sparse, force: false, best_metadata: false, sample_bytes: None };
        let err = dump(&mut source, &header_bytes, &dest_path, &options, &fvde_types::AbortFlag::new()).unwrap_err();
        assert!(matches!(err, DumpError::DestinationExists { .. }));

        std::fs::remove_file(&dest_path).ok();
    }

    #[test]
    fn best_metadata_selects_highest_transaction_id() {
        let (image, header_bytes) = build_s4_fixture();
        let mut source = Cursor::new(image);

        let dir = std::env::temp_dir().join(format!("fvde-dump-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest_path = dir.join("s4-best.img");
        let _ = std::fs::remove_file(&dest_path);

        let options = DumpOptions { mode: DumpMode::Compact, force: true, best_metadata: true, sample_bytes: None };
        let report = dump(&mut source, &header_bytes, &dest_path, &options, &fvde_types::AbortFlag::new()).unwrap();
        assert_eq!(report.mode, DumpMode::Compact);
        // All four copies are still emitted regardless of selection (spec.md §4.D).
        assert_eq!(report.regions.iter().filter(|r| r.name.starts_with("metadata block")).count(), 4);

        std::fs::remove_file(&dest_path).ok();
    }
}
