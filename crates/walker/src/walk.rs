// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use fvde_codec::{
    decode_metadata_block_header, decode_volume_header, locate_encrypted_metadata, verify_metadata_block_checksum,
    verify_volume_header_checksum, VOLUME_HEADER_LEN,
};
use fvde_store::VolumeState;
use fvde_types::{AbortFlag, Provenance};

use crate::errors::WalkError;
use crate::unlocker::{ProcessingOrder, Unlocker, WalkOptions};

/// Block type tag recorded on allocations produced from segment
/// descriptors (spec.md §4.C step 5).
const SEGMENT_DESCRIPTOR_BLOCK_TYPE: u16 = 0x0305;

/// The outcome of one `walk`, mirroring the `processing` section of the
/// `check` JSON report (spec.md §6.6).
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    pub order: ProcessingOrder,
    pub transactions_processed: u64,
    pub metadata_blocks_processed: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

fn read_region(source: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, WalkError> {
    source.seek(SeekFrom::Start(offset)).map_err(WalkError::Seek)?;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf).map_err(WalkError::Read)?;
    Ok(buf)
}

/// Drive an unlocked volume into a populated [`VolumeState`] (spec.md §4.C).
///
/// Reads the volume header and metadata blocks directly from each physical
/// volume's `source_path` (the Unlocker's contract stops at credentials and
/// segment descriptors); marks bootstrap reservations; then walks every
/// logical volume's segment descriptors into `Allocated` extents. Polls
/// `abort` at the start of each metadata block and each logical-volume walk.
pub fn walk(unlocker: &dyn Unlocker, options: &WalkOptions, abort: &AbortFlag) -> Result<(VolumeState, WalkReport), WalkError> {
    let physical = unlocker.physical_volumes();
    let logical = unlocker.logical_volumes();

    let primary = physical.first().ok_or(WalkError::NoPhysicalVolumes)?;

    let mut primary_source = File::open(&primary.source_path).map_err(WalkError::Open)?;
    let header_bytes: [u8; VOLUME_HEADER_LEN] = read_region(&mut primary_source, 0, VOLUME_HEADER_LEN)?
        .try_into()
        .expect("read_region returned exactly VOLUME_HEADER_LEN bytes");
    let header = decode_volume_header(&header_bytes)?;

    let mut state = VolumeState::new(header.block_size);
    let mut report = WalkReport { order: options.order, ..Default::default() };

    log::debug!("decoded volume header: block_size={} metadata_size={}", header.block_size, header.metadata_size);

    // Checksum verification is report-only (spec.md §7: "ChecksumMismatch —
    // report-only unless the caller opts in to strict mode"); a bad volume
    // header checksum doesn't stop the walk, it's just surfaced.
    if !verify_volume_header_checksum(&header_bytes) {
        log::warn!("volume header checksum mismatch");
        report.warnings.push("volume header checksum mismatch".to_string());
    }

    for pv in physical {
        let size_in_blocks = pv.size_bytes / header.block_size as u64;
        let pv_index = state.add_physical_volume(pv.uuid, size_in_blocks)?;
        state.mark_reserved(pv_index, 0, 1, "Volume header")?;
    }
    log::info!("registered {} physical volume(s)", physical.len());

    // Metadata slots and encrypted-metadata regions are bootstrapped once,
    // against physical volume 0 only — spec.md §9's documented quirk, kept
    // faithfully rather than "fixed" to address every physical volume.
    let metadata_blocks_per_slot = (header.metadata_size as u64 / header.block_size as u64).max(1);
    let mut best_transaction_id: Option<u64> = None;
    let mut best_metadata_block: Option<Vec<u8>> = None;

    for (slot, &block_number) in header.metadata_block_numbers.iter().enumerate() {
        if abort.is_set() {
            return Err(WalkError::Aborted);
        }
        state.mark_reserved(0, block_number, metadata_blocks_per_slot, format!("Metadata block {slot}"))?;

        let offset = block_number * header.block_size as u64;
        match read_region(&mut primary_source, offset, header.metadata_size as usize) {
            Ok(block) => match decode_metadata_block_header(&block) {
                Ok(decoded) => {
                    report.metadata_blocks_processed += 1;
                    report.transactions_processed += 1;
                    if !verify_metadata_block_checksum(&block) {
                        log::warn!("metadata block {slot} checksum mismatch");
                        report.warnings.push(format!("metadata block {slot} checksum mismatch"));
                    }
                    if best_transaction_id.is_none_or(|best| decoded.transaction_identifier > best) {
                        best_transaction_id = Some(decoded.transaction_identifier);
                        best_metadata_block = Some(block);
                    }
                }
                Err(e) => report.warnings.push(format!("metadata block {slot}: {e}")),
            },
            Err(e) => report.warnings.push(format!("metadata block {slot}: {e}")),
        }
    }

    if let Some(block) = best_metadata_block {
        match locate_encrypted_metadata(&block, header.block_size) {
            Ok(Some(location)) => {
                if location.enc_md_size_bytes > 0 {
                    let count = (location.enc_md_size_bytes / header.block_size as u64).max(1);
                    if location.enc_md_1_byte_offset > 0 {
                        state.mark_reserved(0, location.enc_md_1_byte_offset / header.block_size as u64, count, "Encrypted metadata 1")?;
                    }
                    if location.enc_md_2_byte_offset > 0 {
                        state.mark_reserved(0, location.enc_md_2_byte_offset / header.block_size as u64, count, "Encrypted metadata 2")?;
                    }
                }
            }
            Ok(None) => report.warnings.push("no volume groups descriptor in the selected metadata block".to_string()),
            Err(e) => report.warnings.push(format!("locating encrypted metadata: {e}")),
        }
    }

    for lv in logical {
        if abort.is_set() {
            log::info!("abort requested; stopping walk");
            return Err(WalkError::Aborted);
        }

        let size_in_blocks = lv.size_bytes / header.block_size as u64;
        let lv_index = state.add_logical_volume(lv.identifier, size_in_blocks)?;

        if lv.is_locked {
            log::debug!("logical volume {} is locked; skipping segment descriptors", lv.uuid_string());
            report.warnings.push(format!("logical volume {} is locked; no segment descriptors available", lv.uuid_string()));
            continue;
        }

        log::debug!("walking {} segment descriptor(s) for logical volume {}", lv.segment_descriptors.len(), lv.uuid_string());
        for descriptor in &lv.segment_descriptors {
            record_provenance_violation(&state, &lv.uuid_string(), descriptor, &mut report);

            let provenance = Provenance {
                transaction_id: 0,
                metadata_block_index: 0,
                block_type: SEGMENT_DESCRIPTOR_BLOCK_TYPE,
            };
            state.mark_allocated(
                descriptor.physical_volume_index,
                descriptor.physical_block_number,
                descriptor.number_of_blocks,
                lv_index,
                descriptor.logical_block_number,
                Some(provenance),
            )?;
        }
    }

    log::info!(
        "walk complete: {} transaction(s), {} error(s), {} warning(s)",
        report.transactions_processed,
        report.errors.len(),
        report.warnings.len()
    );
    Ok((state, report))
}

/// Check a segment descriptor against the state accumulated so far and,
/// if it would land on top of a `Reserved` or already-`Allocated` extent,
/// append a ProvenanceViolation message to `report` (spec.md §7) instead
/// of aborting — `mark_allocated` still runs afterward regardless, per
/// spec.md §4.B/§4.C, which never gate allocation on this check.
fn record_provenance_violation(
    state: &VolumeState,
    lv_uuid: &str,
    descriptor: &fvde_types::SegmentDescriptor,
    report: &mut WalkReport,
) {
    let Some(existing) =
        state.check_overlap(descriptor.physical_volume_index, descriptor.physical_block_number, descriptor.number_of_blocks)
    else {
        return;
    };

    let segment = format!(
        "lv {lv_uuid} physical [{}..{})",
        descriptor.physical_block_number,
        descriptor.physical_block_number + descriptor.number_of_blocks
    );
    let message = match existing {
        fvde_types::Extent::Reserved { description, .. } => {
            format!("reserved-violation: {segment} overlaps reserved region {description:?}")
        }
        fvde_types::Extent::Allocated { lv, .. } => {
            format!("allocate-after-allocate: {segment} overlaps an extent already allocated to logical volume {lv}")
        }
        fvde_types::Extent::Free { .. } => format!("overlap: {segment} overlaps a free extent"),
        fvde_types::Extent::Unknown => return,
    };
    log::warn!("{message}");
    report.errors.push(message);
}

#[cfg(test)]
mod tests {
    use fvde_types::{SegmentDescriptor, UnlockedLogicalVolume, UnlockedPhysicalVolume, VolumeMasterKey, VolumeTweakKey};
    use test_log::test;

    use super::*;

    struct FixtureUnlocker {
        physical: Vec<UnlockedPhysicalVolume>,
        logical: Vec<UnlockedLogicalVolume>,
    }

    impl Unlocker for FixtureUnlocker {
        fn physical_volumes(&self) -> &[UnlockedPhysicalVolume] {
            &self.physical
        }

        fn logical_volumes(&self) -> &[UnlockedLogicalVolume] {
            &self.logical
        }
    }

    fn write_fixture_volume(dir: &std::path::Path) -> std::path::PathBuf {
        use fvde_codec::{encode_volume_header, VOLUME_HEADER_LEN};

        let block_size = 4096u32;
        let metadata_size = 8192u64;
        let path = dir.join("volume.img");

        let mut header = [0u8; VOLUME_HEADER_LEN];
        header[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        header[88..90].copy_from_slice(b"CS");
        header[96..100].copy_from_slice(&block_size.to_le_bytes());
        header[100..104].copy_from_slice(&(metadata_size as u32).to_le_bytes());
        encode_volume_header(&mut header, [1, 3, 5, 7]);

        let total_len = 7 * block_size as usize + 4 * metadata_size as usize;
        let mut image = vec![0u8; total_len];
        image[..VOLUME_HEADER_LEN].copy_from_slice(&header);

        for &block_number in &[1u64, 3, 5, 7] {
            let offset = (block_number * block_size as u64) as usize;
            let mut block = vec![0u8; metadata_size as usize];
            block[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
            block[16..24].copy_from_slice(&42u64.to_le_bytes());
            let initial = u32::from_le_bytes(block[4..8].try_into().unwrap());
            let computed = fvde_codec::WeakCrc32::compute(initial, &block[8..]);
            block[0..4].copy_from_slice(&computed.to_le_bytes());
            image[offset..offset + metadata_size as usize].copy_from_slice(&block);
        }

        std::fs::write(&path, &image).unwrap();
        path
    }

    #[test]
    fn walk_reserves_header_and_metadata_and_allocates_segments() {
        let dir = tempfile_dir("basic");
        let path = write_fixture_volume(&dir);

        let physical = vec![UnlockedPhysicalVolume {
            uuid: [1; 16],
            size_bytes: 7 * 4096 + 4 * 8192,
            source_path: path,
        }];
        let logical = vec![UnlockedLogicalVolume {
            is_locked: false,
            identifier: [2; 16],
            utf8_name: Some("Macintosh HD".to_string()),
            size_bytes: 10 * 4096,
            volume_master_key: Some(VolumeMasterKey::new([0; 16])),
            volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
            segment_descriptors: vec![SegmentDescriptor {
                physical_volume_index: 0,
                physical_block_number: 200,
                number_of_blocks: 10,
                logical_block_number: 0,
            }],
        }];

        let unlocker = FixtureUnlocker { physical, logical };
        let (state, report) = walk(&unlocker, &WalkOptions::default(), &AbortFlag::new()).expect("walk succeeds on a well-formed fixture");

        assert_eq!(report.metadata_blocks_processed, 4);
        assert_eq!(report.transactions_processed, 4);

        let stats = state.recompute_statistics();
        assert_eq!(stats.physical[0].allocated_blocks, 10);
        assert!(stats.physical[0].reserved_blocks > 0);

        let found = state.find_logical_extent(0, 5).expect("block 5 is within the allocated segment");
        assert_eq!(found.phys_start(), Some(200));
    }

    #[test]
    fn corrupt_header_checksum_is_a_warning_not_a_failure() {
        let dir = tempfile_dir("checksum");
        let path = write_fixture_volume(&dir);

        // Flip a byte inside the checksummed region without recomputing
        // the checksum, simulating on-disk corruption.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[400] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let physical = vec![UnlockedPhysicalVolume {
            uuid: [1; 16],
            size_bytes: 7 * 4096 + 4 * 8192,
            source_path: path,
        }];

        let unlocker = FixtureUnlocker { physical, logical: Vec::new() };
        let (_, report) =
            walk(&unlocker, &WalkOptions::default(), &AbortFlag::new()).expect("checksum mismatch is reported, not fatal");

        assert!(report.warnings.iter().any(|w| w.contains("volume header checksum mismatch")), "got: {:?}", report.warnings);
    }

    #[test]
    fn overlapping_segment_descriptors_are_reported_not_aborted() {
        let dir = tempfile_dir("overlap");
        let path = write_fixture_volume(&dir);

        let physical = vec![UnlockedPhysicalVolume {
            uuid: [1; 16],
            size_bytes: 7 * 4096 + 4 * 8192,
            source_path: path,
        }];
        // Two logical volumes whose segment descriptors claim overlapping
        // physical blocks: the second is an allocate-after-allocate
        // violation, not a hard walk failure (spec.md §7).
        let logical = vec![
            UnlockedLogicalVolume {
                is_locked: false,
                identifier: [2; 16],
                utf8_name: None,
                size_bytes: 10 * 4096,
                volume_master_key: Some(VolumeMasterKey::new([0; 16])),
                volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
                segment_descriptors: vec![SegmentDescriptor {
                    physical_volume_index: 0,
                    physical_block_number: 200,
                    number_of_blocks: 10,
                    logical_block_number: 0,
                }],
            },
            UnlockedLogicalVolume {
                is_locked: false,
                identifier: [3; 16],
                utf8_name: None,
                size_bytes: 10 * 4096,
                volume_master_key: Some(VolumeMasterKey::new([0; 16])),
                volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
                segment_descriptors: vec![SegmentDescriptor {
                    physical_volume_index: 0,
                    physical_block_number: 205,
                    number_of_blocks: 5,
                    logical_block_number: 0,
                }],
            },
        ];

        let unlocker = FixtureUnlocker { physical, logical };
        let (state, report) = walk(&unlocker, &WalkOptions::default(), &AbortFlag::new()).expect("overlap is reported, not fatal");

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("allocate-after-allocate"), "got: {}", report.errors[0]);

        // Both segments still land in the store despite the violation.
        assert!(state.find_physical_extent(0, 200).is_some());
        assert!(state.find_physical_extent(0, 206).is_some());
    }

    #[test]
    fn segment_overlapping_reserved_metadata_is_a_reserved_violation() {
        let dir = tempfile_dir("reserved-violation");
        let path = write_fixture_volume(&dir);

        let physical = vec![UnlockedPhysicalVolume {
            uuid: [1; 16],
            size_bytes: 7 * 4096 + 4 * 8192,
            source_path: path,
        }];
        // Metadata block 0 is reserved at block 1 (see write_fixture_volume);
        // a segment descriptor claiming that block collides with it.
        let logical = vec![UnlockedLogicalVolume {
            is_locked: false,
            identifier: [2; 16],
            utf8_name: None,
            size_bytes: 4096,
            volume_master_key: Some(VolumeMasterKey::new([0; 16])),
            volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
            segment_descriptors: vec![SegmentDescriptor {
                physical_volume_index: 0,
                physical_block_number: 1,
                number_of_blocks: 1,
                logical_block_number: 0,
            }],
        }];

        let unlocker = FixtureUnlocker { physical, logical };
        let (_, report) = walk(&unlocker, &WalkOptions::default(), &AbortFlag::new()).expect("overlap is reported, not fatal");

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("reserved-violation"), "got: {}", report.errors[0]);
    }

    #[test]
    fn processing_order_does_not_change_the_resulting_extent_order() {
        let dir = tempfile_dir("order");
        let path = write_fixture_volume(&dir);

        let make_unlocker = || FixtureUnlocker {
            physical: vec![UnlockedPhysicalVolume {
                uuid: [1; 16],
                size_bytes: 7 * 4096 + 4 * 8192,
                source_path: path.clone(),
            }],
            logical: vec![
                UnlockedLogicalVolume {
                    is_locked: false,
                    identifier: [2; 16],
                    utf8_name: None,
                    size_bytes: 4096,
                    volume_master_key: Some(VolumeMasterKey::new([0; 16])),
                    volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
                    segment_descriptors: vec![SegmentDescriptor {
                        physical_volume_index: 0,
                        physical_block_number: 100,
                        number_of_blocks: 1,
                        logical_block_number: 0,
                    }],
                },
                UnlockedLogicalVolume {
                    is_locked: false,
                    identifier: [3; 16],
                    utf8_name: None,
                    size_bytes: 4096,
                    volume_master_key: Some(VolumeMasterKey::new([0; 16])),
                    volume_tweak_key: Some(VolumeTweakKey::new([0; 32])),
                    segment_descriptors: vec![SegmentDescriptor {
                        physical_volume_index: 0,
                        physical_block_number: 101,
                        number_of_blocks: 1,
                        logical_block_number: 0,
                    }],
                },
            ],
        };

        let mut orders_results = Vec::new();
        for order in [ProcessingOrder::Ascending, ProcessingOrder::Descending, ProcessingOrder::Physical] {
            let unlocker = make_unlocker();
            let options = WalkOptions { order, stop: Default::default() };
            let (state, _) = walk(&unlocker, &options, &AbortFlag::new()).unwrap();
            let starts: Vec<u64> = state.physical_volumes()[0].extents().iter().filter_map(|e| e.phys_start()).collect();
            orders_results.push(starts);
        }

        assert!(orders_results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    fn tempfile_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("fvde-walker-test-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
