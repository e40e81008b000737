// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use snafu::ensure;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{FromBytes, IntoBytes};

use crate::crc::WeakCrc32;
use crate::{CodecError, NoDescriptorSnafu, ShortBufferSnafu};

/// Default metadata block size used when formatting a new container.
/// Existing containers may use a different size; always prefer the value
/// decoded from the volume header over this constant.
pub const DEFAULT_METADATA_SIZE: usize = 8192;

/// Length of the fixed portion of a metadata block header.
pub const METADATA_BLOCK_HEADER_LEN: usize = 64;

const CHECKSUM_OFFSET: usize = 0;
const CHECKSUM_INITIAL_OFFSET: usize = 4;
const CHECKSUM_REGION_START: usize = 8;
const TRANSACTION_ID_OFFSET: usize = 16;
const VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET: usize = 220;
const VGD_MIN_OFFSET: u32 = 64;

// Offsets relative to the start of the volume groups descriptor.
const VGD_ENCRYPTED_METADATA_SIZE_OFFSET: usize = 8;
const VGD_ENCRYPTED_METADATA_1_OFFSET: usize = 32;
const VGD_ENCRYPTED_METADATA_2_OFFSET: usize = 40;
const VGD_TAIL_LEN: usize = VGD_ENCRYPTED_METADATA_2_OFFSET + 8;

const BLOCK_NUMBER_MASK: u64 = (1 << 48) - 1;

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    U32::<LittleEndian>::read_from_bytes(&bytes[offset..offset + 4])
        .expect("slice is exactly 4 bytes")
        .get()
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    U32::<LittleEndian>::new(value).write_to(&mut bytes[offset..offset + 4]).expect("slice is exactly 4 bytes");
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    U64::<LittleEndian>::read_from_bytes(&bytes[offset..offset + 8])
        .expect("slice is exactly 8 bytes")
        .get()
}

fn write_u64(bytes: &mut [u8], offset: usize, value: u64) {
    U64::<LittleEndian>::new(value).write_to(&mut bytes[offset..offset + 8]).expect("slice is exactly 8 bytes");
}

/// The fixed portion of a metadata block, decoded (spec.md §4.A).
#[derive(Debug, Clone, Copy)]
pub struct MetadataBlockHeader {
    pub checksum: u32,
    pub checksum_initial: u32,
    pub transaction_identifier: u64,
}

/// Where a metadata block's pair of encrypted-metadata regions live,
/// resolved from its volume groups descriptor.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedMetadataLocation {
    pub enc_md_size_bytes: u64,
    pub enc_md_1_byte_offset: u64,
    pub enc_md_2_byte_offset: u64,
    pub transaction_id: u64,
}

fn require_len(block: &[u8], needed: usize) -> Result<(), CodecError> {
    ensure!(block.len() >= needed, ShortBufferSnafu { needed, actual: block.len() });
    Ok(())
}

/// Decode the fixed 64-byte header shared by every metadata block.
pub fn decode_metadata_block_header(block: &[u8]) -> Result<MetadataBlockHeader, CodecError> {
    require_len(block, METADATA_BLOCK_HEADER_LEN)?;
    Ok(MetadataBlockHeader {
        checksum: read_u32(block, CHECKSUM_OFFSET),
        checksum_initial: read_u32(block, CHECKSUM_INITIAL_OFFSET),
        transaction_identifier: read_u64(block, TRANSACTION_ID_OFFSET),
    })
}

/// Recompute a metadata block's checksum over `[8..len)` using the initial
/// value stored at `[4..8)`, and compare it against the stored checksum.
pub fn verify_metadata_block_checksum(block: &[u8]) -> bool {
    if block.len() < CHECKSUM_REGION_START {
        return false;
    }
    let stored = read_u32(block, CHECKSUM_OFFSET);
    let initial = read_u32(block, CHECKSUM_INITIAL_OFFSET);
    let computed = WeakCrc32::compute(initial, &block[CHECKSUM_REGION_START..]);
    stored == computed
}

/// Resolve a metadata block's encrypted-metadata regions, or `Ok(None)`
/// when the block carries no volume groups descriptor (descriptor offset
/// field `<= 64`, spec.md §4.A) — that's not an error, just an empty slot.
pub fn locate_encrypted_metadata(block: &[u8], block_size: u32) -> Result<Option<EncryptedMetadataLocation>, CodecError> {
    require_len(block, VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET + 4)?;
    let vgd_offset = read_u32(block, VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET);
    if vgd_offset <= VGD_MIN_OFFSET {
        return Ok(None);
    }

    let base = vgd_offset as usize;
    require_len(block, base + VGD_TAIL_LEN)?;

    let size_blocks = read_u64(block, base + VGD_ENCRYPTED_METADATA_SIZE_OFFSET);
    let raw_1 = read_u64(block, base + VGD_ENCRYPTED_METADATA_1_OFFSET);
    let raw_2 = read_u64(block, base + VGD_ENCRYPTED_METADATA_2_OFFSET);
    let transaction_id = read_u64(block, TRANSACTION_ID_OFFSET);

    Ok(Some(EncryptedMetadataLocation {
        enc_md_size_bytes: size_blocks * block_size as u64,
        enc_md_1_byte_offset: (raw_1 & BLOCK_NUMBER_MASK) * block_size as u64,
        enc_md_2_byte_offset: (raw_2 & BLOCK_NUMBER_MASK) * block_size as u64,
        transaction_id,
    }))
}

/// Overwrite a metadata block's two encrypted-metadata block numbers (full
/// 64-bit values, no masking — spec.md §4.D rewrite semantics) and
/// recompute the checksum. Fails if the block has no volume groups
/// descriptor to rewrite.
pub fn rewrite_metadata_block(block: &mut [u8], new_enc_md_1_block_num: u64, new_enc_md_2_block_num: u64) -> Result<(), CodecError> {
    require_len(block, VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET + 4)?;
    let vgd_offset = read_u32(block, VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET);
    ensure!(vgd_offset > VGD_MIN_OFFSET, NoDescriptorSnafu { offset: vgd_offset });

    let base = vgd_offset as usize;
    require_len(block, base + VGD_TAIL_LEN)?;
    write_u64(block, base + VGD_ENCRYPTED_METADATA_1_OFFSET, new_enc_md_1_block_num);
    write_u64(block, base + VGD_ENCRYPTED_METADATA_2_OFFSET, new_enc_md_2_block_num);

    let initial = read_u32(block, CHECKSUM_INITIAL_OFFSET);
    let computed = WeakCrc32::compute(initial, &block[CHECKSUM_REGION_START..]);
    write_u32(block, CHECKSUM_OFFSET, computed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const BLOCK_SIZE: u32 = 4096;

    fn build_s4_block() -> Vec<u8> {
        let mut b = vec![0u8; DEFAULT_METADATA_SIZE];
        write_u32(&mut b, CHECKSUM_INITIAL_OFFSET, 0xFFFF_FFFF);
        write_u64(&mut b, TRANSACTION_ID_OFFSET, 42);
        write_u32(&mut b, VOLUME_GROUPS_DESCRIPTOR_OFFSET_OFFSET, 128);
        write_u64(&mut b, 128 + VGD_ENCRYPTED_METADATA_SIZE_OFFSET, 4); // 4 blocks -> 16384 bytes
        write_u64(&mut b, 128 + VGD_ENCRYPTED_METADATA_1_OFFSET, 9);
        write_u64(&mut b, 128 + VGD_ENCRYPTED_METADATA_2_OFFSET, 17);
        b
    }

    #[test]
    fn no_descriptor_is_none_not_an_error() {
        let b = vec![0u8; DEFAULT_METADATA_SIZE];
        assert!(locate_encrypted_metadata(&b, BLOCK_SIZE).unwrap().is_none());
    }

    #[test]
    fn s4_locates_encrypted_metadata() {
        let b = build_s4_block();
        let loc = locate_encrypted_metadata(&b, BLOCK_SIZE).unwrap().expect("descriptor present");
        assert_eq!(loc.enc_md_size_bytes, 16384);
        assert_eq!(loc.enc_md_1_byte_offset, 9 * 4096);
        assert_eq!(loc.enc_md_2_byte_offset, 17 * 4096);
        assert_eq!(loc.transaction_id, 42);
    }

    #[test]
    fn rewrite_updates_block_numbers_and_checksum() {
        let mut b = build_s4_block();
        rewrite_metadata_block(&mut b, 100, 200).unwrap();
        assert!(verify_metadata_block_checksum(&b));

        let loc = locate_encrypted_metadata(&b, BLOCK_SIZE).unwrap().unwrap();
        assert_eq!(loc.enc_md_1_byte_offset, 100 * 4096);
        assert_eq!(loc.enc_md_2_byte_offset, 200 * 4096);
    }

    #[test]
    fn rewrite_without_descriptor_fails() {
        let mut b = vec![0u8; DEFAULT_METADATA_SIZE];
        assert!(rewrite_metadata_block(&mut b, 1, 2).is_err());
    }

    #[test]
    fn high_sixteen_bits_of_block_number_are_masked_as_pv_index() {
        let mut b = build_s4_block();
        let tagged = (7u64 << 48) | 9;
        write_u64(&mut b, 128 + VGD_ENCRYPTED_METADATA_1_OFFSET, tagged);
        let loc = locate_encrypted_metadata(&b, BLOCK_SIZE).unwrap().unwrap();
        assert_eq!(loc.enc_md_1_byte_offset, 9 * 4096);
    }
}
