// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::hint::black_box;
use std::path::PathBuf;

use crate::SegmentDescriptor;

/// Fixed-size key material that zeroes itself on drop.
///
/// Per-logical-volume keys exist only between Unlocker completion and the
/// point of dmsetup-table emission / keyring insertion; any buffer that
/// held them must be explicitly zeroed before release. `black_box` around
/// the zeroing write discourages the compiler from proving the write dead
/// and eliding it, without pulling in a dedicated zeroizing crate for this
/// one small guarantee.
pub struct KeyMaterial<const N: usize>([u8; N]);

impl<const N: usize> KeyMaterial<N> {
    pub fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Drop for KeyMaterial<N> {
    fn drop(&mut self) {
        for byte in self.0.iter_mut() {
            *byte = black_box(0u8);
        }
    }
}

impl<const N: usize> fmt::Debug for KeyMaterial<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial<{N}>(<redacted>)")
    }
}

/// The master key (16 bytes, used for AES-XTS) for one logical volume.
pub type VolumeMasterKey = KeyMaterial<16>;
/// The tweak key (32 bytes, used for AES-XTS) for one logical volume.
pub type VolumeTweakKey = KeyMaterial<32>;

/// One physical volume as reported by the Unlocker.
///
/// `source_path` is carried alongside `uuid`/`size_bytes` so the core can
/// open its own read handle onto the physical volume (the "file-IO pool
/// indexed by physical-volume index" of spec.md §5) to decode the volume
/// header and metadata blocks directly — the Unlocker's own contract
/// (spec.md §6.1) covers credentials and segment descriptors only, not
/// Core Storage layout parsing, which stays in this core's hands.
#[derive(Debug, Clone)]
pub struct UnlockedPhysicalVolume {
    pub uuid: [u8; 16],
    pub size_bytes: u64,
    pub source_path: PathBuf,
}

/// One logical volume as reported by the Unlocker (spec.md §6.1).
///
/// `volume_master_key`/`volume_tweak_key`/`segment_descriptors` are only
/// meaningful when `is_locked` is `false`.
#[derive(Debug)]
pub struct UnlockedLogicalVolume {
    pub is_locked: bool,
    pub identifier: [u8; 16],
    pub utf8_name: Option<String>,
    pub size_bytes: u64,
    pub volume_master_key: Option<VolumeMasterKey>,
    pub volume_tweak_key: Option<VolumeTweakKey>,
    pub segment_descriptors: Vec<SegmentDescriptor>,
}

impl UnlockedLogicalVolume {
    /// Lowercase dashed UUID form used in dmsetup table lines and keyring
    /// descriptions (spec.md §6.3/§6.4).
    pub fn uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.identifier).hyphenated().to_string()
    }
}
