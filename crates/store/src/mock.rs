// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Build a populated [`VolumeState`] from literal segment-descriptor
//! tables, without touching the filesystem or an `Unlocker`.
//!
//! Mirrors the reference workspace's `disks::mock::MockDisk`: a small
//! builder wrapping the real type, used by the walker and CLI test
//! suites to set up fixtures in a couple of chained calls.

use fvde_types::Provenance;

use crate::VolumeState;

/// One segment to allocate via [`MockUnlockedVolume::allocate`].
#[derive(Debug, Clone, Copy)]
pub struct MockSegment {
    pub pv: usize,
    pub phys_start: u64,
    pub count: u64,
    pub lv: usize,
    pub logical_start: u64,
}

/// A `VolumeState` under construction. Every mutator panics on invalid
/// input (bad index, capacity exceeded) rather than returning `Result`:
/// fixtures are expected to be correct by construction, and a panicking
/// test fixture fails loudly at the call site instead of silently
/// producing an incomplete state.
pub struct MockUnlockedVolume {
    state: VolumeState,
}

impl MockUnlockedVolume {
    pub fn new(block_size: u32) -> Self {
        Self { state: VolumeState::new(block_size) }
    }

    pub fn add_physical_volume(&mut self, uuid: [u8; 16], size_in_blocks: u64) -> usize {
        self.state.add_physical_volume(uuid, size_in_blocks).expect("mock stays within pv capacity")
    }

    pub fn add_logical_volume(&mut self, uuid: [u8; 16], size_in_blocks: u64) -> usize {
        self.state.add_logical_volume(uuid, size_in_blocks).expect("mock stays within lv capacity")
    }

    pub fn reserve(&mut self, pv: usize, start: u64, count: u64, description: &str) -> &mut Self {
        self.state.mark_reserved(pv, start, count, description).expect("mock reserves only existing pvs");
        self
    }

    pub fn allocate(&mut self, segments: &[MockSegment]) -> &mut Self {
        for segment in segments {
            self.state
                .mark_allocated(segment.pv, segment.phys_start, segment.count, segment.lv, segment.logical_start, None)
                .expect("mock allocates only existing pv/lv pairs");
        }
        self
    }

    pub fn free(&mut self, pv: usize, start: u64, count: u64, provenance: Option<Provenance>) -> &mut Self {
        self.state.mark_free(pv, start, count, provenance).expect("mock frees only existing pvs");
        self
    }

    pub fn build(self) -> VolumeState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn builds_a_populated_state() {
        let mut mock = MockUnlockedVolume::new(4096);
        let pv = mock.add_physical_volume([1; 16], 1000);
        let lv = mock.add_logical_volume([2; 16], 100);
        mock.reserve(pv, 0, 1, "Volume header").allocate(&[MockSegment {
            pv,
            phys_start: 10,
            count: 5,
            lv,
            logical_start: 0,
        }]);

        let state = mock.build();
        assert_eq!(state.physical_volumes()[0].extents().len(), 2);
        let stats = state.recompute_statistics();
        assert_eq!(stats.physical[0].reserved_blocks, 1);
        assert_eq!(stats.physical[0].allocated_blocks, 5);
    }
}
