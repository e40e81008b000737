// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use serde::Serialize;

/// Per-physical-volume block totals, derived purely from its extent list
/// (spec.md §3, I5). Field names match the `check` JSON report's
/// `allocation.physical.<idx>` shape (spec.md §6.6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhysicalVolumeStats {
    pub reserved_blocks: u64,
    pub allocated_blocks: u64,
    pub free_blocks: u64,
}

/// Per-logical-volume block totals. `unmapped_blocks` is
/// `max(0, size_in_blocks - sum_of_allocated_phys_count)` per spec.md §4.B.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LogicalVolumeStats {
    pub mapped_blocks: u64,
    pub unmapped_blocks: u64,
}

/// The full statistics snapshot returned by `VolumeState::recompute_statistics`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub physical: Vec<PhysicalVolumeStats>,
    pub logical: Vec<LogicalVolumeStats>,
}
