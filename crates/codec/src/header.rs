// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use snafu::ensure;
use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{FromBytes, IntoBytes};

use crate::crc::WeakCrc32;
use crate::{BadSignatureSnafu, CodecError};

/// Length of a Core Storage volume header, in bytes.
pub const VOLUME_HEADER_LEN: usize = 512;

const SIGNATURE: [u8; 2] = *b"CS";

const CHECKSUM_OFFSET: usize = 0;
const CHECKSUM_INITIAL_OFFSET: usize = 4;
const CHECKSUM_REGION_START: usize = 8;
const PHYSICAL_VOLUME_SIZE_OFFSET: usize = 72;
const SIGNATURE_OFFSET: usize = 88;
const BLOCK_SIZE_OFFSET: usize = 96;
const METADATA_SIZE_OFFSET: usize = 100;
const METADATA_BLOCK_NUMBERS_OFFSET: usize = 104;
const METADATA_BLOCK_NUMBERS_COUNT: usize = 4;

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

/// A decoded Core Storage volume header (spec.md §4.A).
///
/// `metadata_size` occupies only `[100..104)`; the adjoining `[104..136)`
/// belongs solely to `metadata_block_numbers` (spec.md §3: "implementations
/// MUST treat `[104..136]` as the four-entry array"), so the two fields
/// never overlap (see DESIGN.md, Open Question 2, for the other byte range
/// the spec explicitly leaves unclaimed).
#[derive(Debug, Clone, Copy)]
pub struct VolumeHeader {
    pub checksum: u32,
    pub checksum_initial: u32,
    pub physical_volume_size: u64,
    pub block_size: u32,
    pub metadata_size: u32,
    pub metadata_block_numbers: [u64; METADATA_BLOCK_NUMBERS_COUNT],
}

impl VolumeHeader {
    /// Metadata block numbers converted to physical byte offsets.
    pub fn metadata_offsets(&self) -> [u64; METADATA_BLOCK_NUMBERS_COUNT] {
        let mut offsets = [0u64; METADATA_BLOCK_NUMBERS_COUNT];
        for (offset, number) in offsets.iter_mut().zip(self.metadata_block_numbers) {
            *offset = number * self.block_size as u64;
        }
        offsets
    }
}

/// Decode a volume header, rejecting anything that doesn't carry the `"CS"`
/// signature at byte 88.
pub fn decode_volume_header(bytes: &[u8; VOLUME_HEADER_LEN]) -> Result<VolumeHeader, CodecError> {
    let signature: [u8; 2] = bytes[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2]
        .try_into()
        .expect("slice is exactly 2 bytes");
    ensure!(signature == SIGNATURE, BadSignatureSnafu { found: signature });

    let mut metadata_block_numbers = [0u64; METADATA_BLOCK_NUMBERS_COUNT];
    for (i, number) in metadata_block_numbers.iter_mut().enumerate() {
        *number = read_u64(bytes, METADATA_BLOCK_NUMBERS_OFFSET + i * 8);
    }

    Ok(VolumeHeader {
        checksum: read_u32(bytes, CHECKSUM_OFFSET),
        checksum_initial: read_u32(bytes, CHECKSUM_INITIAL_OFFSET),
        physical_volume_size: read_u64(bytes, PHYSICAL_VOLUME_SIZE_OFFSET),
        block_size: read_u32(bytes, BLOCK_SIZE_OFFSET),
        metadata_size: read_u32(bytes, METADATA_SIZE_OFFSET),
        metadata_block_numbers,
    })
}

/// Recompute the header checksum over `[8..512)` using the initial value
/// stored at `[4..8)`, and compare it against the stored checksum at `[0..4)`.
pub fn verify_volume_header_checksum(bytes: &[u8; VOLUME_HEADER_LEN]) -> bool {
    let stored = read_u32(bytes, CHECKSUM_OFFSET);
    let initial = read_u32(bytes, CHECKSUM_INITIAL_OFFSET);
    let computed = WeakCrc32::compute(initial, &bytes[CHECKSUM_REGION_START..]);
    stored == computed
}

/// Overwrite the four metadata block numbers and recompute the checksum
/// using whatever initial value is already stored at `[4..8)`.
pub fn encode_volume_header(bytes: &mut [u8; VOLUME_HEADER_LEN], metadata_block_numbers: [u64; METADATA_BLOCK_NUMBERS_COUNT]) {
    for (i, number) in metadata_block_numbers.into_iter().enumerate() {
        write_u64(bytes, METADATA_BLOCK_NUMBERS_OFFSET + i * 8, number);
    }
    let initial = read_u32(bytes, CHECKSUM_INITIAL_OFFSET);
    let computed = WeakCrc32::compute(initial, &bytes[CHECKSUM_REGION_START..]);
    write_u32(bytes, CHECKSUM_OFFSET, computed);
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn build_s1_header() -> [u8; VOLUME_HEADER_LEN] {
        let mut b = [0u8; VOLUME_HEADER_LEN];
        write_u32(&mut b, CHECKSUM_INITIAL_OFFSET, 0xFFFF_FFFF);
        b[SIGNATURE_OFFSET..SIGNATURE_OFFSET + 2].copy_from_slice(&SIGNATURE);
        write_u32(&mut b, BLOCK_SIZE_OFFSET, 4096);
        write_u32(&mut b, METADATA_SIZE_OFFSET, 8192);
        for (i, number) in [1u64, 3, 5, 7].into_iter().enumerate() {
            write_u64(&mut b, METADATA_BLOCK_NUMBERS_OFFSET + i * 8, number);
        }
        b
    }

    #[test]
    fn s1_decodes_size_block_size_and_metadata_offsets() {
        let b = build_s1_header();
        let header = decode_volume_header(&b).expect("signature is valid");
        assert_eq!(header.physical_volume_size, 0);
        assert_eq!(header.block_size, 4096);
        assert_eq!(header.metadata_offsets(), [4096, 12288, 20480, 28672]);
    }

    #[test]
    fn bad_signature_is_rejected() {
        let mut b = build_s1_header();
        b[SIGNATURE_OFFSET] = b'X';
        assert!(decode_volume_header(&b).is_err());
    }

    #[test]
    fn encode_then_verify_round_trips() {
        let mut b = build_s1_header();
        encode_volume_header(&mut b, [1, 3, 5, 7]);
        assert!(verify_volume_header_checksum(&b));

        b[400] ^= 0xFF;
        assert!(!verify_volume_header_checksum(&b));
    }

    #[test]
    fn encode_updates_metadata_block_numbers() {
        let mut b = build_s1_header();
        encode_volume_header(&mut b, [2, 4, 6, 8]);
        let header = decode_volume_header(&b).unwrap();
        assert_eq!(header.metadata_block_numbers, [2, 4, 6, 8]);
        assert!(verify_volume_header_checksum(&b));
    }
}
