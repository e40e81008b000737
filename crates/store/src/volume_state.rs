// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use fvde_types::{Extent, Provenance};

use crate::errors::StoreError;
use crate::statistics::{LogicalVolumeStats, PhysicalVolumeStats, Statistics};

/// The on-disk cap on physical and logical volumes (spec.md §3). "A
/// simplification, not an on-disk limit" (spec.md §9) — lifting it would
/// not change the contract, so it stays a plain constant rather than a
/// generic parameter.
pub const MAX_VOLUMES: usize = 16;

/// One physical volume's allocation state: an ordered, non-overlapping
/// extent list covering (at most) `size_in_blocks` blocks.
#[derive(Debug, Clone)]
pub struct PhysicalVolume {
    pub uuid: [u8; 16],
    pub size_in_blocks: u64,
    extents: Vec<Extent>,
}

impl PhysicalVolume {
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }
}

/// One logical volume's allocation state: an ordered extent list of
/// `Allocated`-only clones (see `SPEC_FULL.md`'s representation notes for
/// why this is a parallel list rather than a back-pointer into the pv-list).
#[derive(Debug, Clone)]
pub struct LogicalVolume {
    pub uuid: [u8; 16],
    pub size_in_blocks: u64,
    extents: Vec<Extent>,
}

impl LogicalVolume {
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }
}

/// The root allocation-state container (spec.md §3/§4.B).
///
/// Created empty; volumes and extents are appended by the Volume Walker
/// (or, in tests, directly). Nothing is ever removed — an append-only log,
/// per spec.md §3's lifecycle rules.
#[derive(Debug, Clone)]
pub struct VolumeState {
    physical_volumes: Vec<PhysicalVolume>,
    logical_volumes: Vec<LogicalVolume>,
    pub block_size: u32,
}

fn phys_start_key(extent: &Extent) -> u64 {
    extent.phys_start().expect("extents inserted into a pv-list always carry a physical range")
}

fn logical_start_key(extent: &Extent) -> u64 {
    match extent {
        Extent::Allocated { logical_start, .. } => *logical_start,
        _ => unreachable!("only Allocated extents are inserted into a lv-list"),
    }
}

/// Insert `item` so the list stays sorted ascending by `key`; on equal
/// keys the new item lands after every existing item with that key
/// (spec.md §4.B's "stable append at equal key" ordering discipline).
fn insert_sorted(items: &mut Vec<Extent>, item: Extent, key: impl Fn(&Extent) -> u64) {
    let k = key(&item);
    let pos = items.partition_point(|existing| key(existing) <= k);
    items.insert(pos, item);
}

impl VolumeState {
    pub fn new(block_size: u32) -> Self {
        Self {
            physical_volumes: Vec::new(),
            logical_volumes: Vec::new(),
            block_size,
        }
    }

    pub fn physical_volumes(&self) -> &[PhysicalVolume] {
        &self.physical_volumes
    }

    pub fn logical_volumes(&self) -> &[LogicalVolume] {
        &self.logical_volumes
    }

    fn physical_volume(&self, pv: usize) -> Result<&PhysicalVolume, StoreError> {
        self.physical_volumes.get(pv).ok_or(StoreError::PhysicalVolumeOutOfBounds {
            index: pv,
            len: self.physical_volumes.len(),
        })
    }

    fn logical_volume(&self, lv: usize) -> Result<&LogicalVolume, StoreError> {
        self.logical_volumes.get(lv).ok_or(StoreError::LogicalVolumeOutOfBounds {
            index: lv,
            len: self.logical_volumes.len(),
        })
    }

    /// Register a physical volume, capped at [`MAX_VOLUMES`].
    pub fn add_physical_volume(&mut self, uuid: [u8; 16], size_in_blocks: u64) -> Result<usize, StoreError> {
        if self.physical_volumes.len() >= MAX_VOLUMES {
            return Err(StoreError::PhysicalVolumeCapacityExceeded);
        }
        self.physical_volumes.push(PhysicalVolume {
            uuid,
            size_in_blocks,
            extents: Vec::new(),
        });
        Ok(self.physical_volumes.len() - 1)
    }

    /// Register a logical volume, capped at [`MAX_VOLUMES`].
    pub fn add_logical_volume(&mut self, uuid: [u8; 16], size_in_blocks: u64) -> Result<usize, StoreError> {
        if self.logical_volumes.len() >= MAX_VOLUMES {
            return Err(StoreError::LogicalVolumeCapacityExceeded);
        }
        self.logical_volumes.push(LogicalVolume {
            uuid,
            size_in_blocks,
            extents: Vec::new(),
        });
        Ok(self.logical_volumes.len() - 1)
    }

    /// Insert a `Reserved` extent. Does NOT check for overlap with existing
    /// extents — permissive during bootstrap, per spec.md §4.B.
    pub fn mark_reserved(&mut self, pv: usize, start: u64, count: u64, description: impl Into<String>) -> Result<(), StoreError> {
        self.physical_volume(pv)?;
        let extent = Extent::Reserved {
            pv,
            phys_start: start,
            phys_count: count,
            description: description.into(),
        };
        insert_sorted(&mut self.physical_volumes[pv].extents, extent, phys_start_key);
        Ok(())
    }

    /// Insert a `Free` extent. Same permissive insertion as `mark_reserved`.
    pub fn mark_free(&mut self, pv: usize, start: u64, count: u64, provenance: Option<Provenance>) -> Result<(), StoreError> {
        self.physical_volume(pv)?;
        let extent = Extent::Free {
            pv,
            phys_start: start,
            phys_count: count,
            provenance,
        };
        insert_sorted(&mut self.physical_volumes[pv].extents, extent, phys_start_key);
        Ok(())
    }

    /// Insert an `Allocated` extent into both the pv-list and the lv-list,
    /// atomically within this one call — the only constructor for
    /// `Allocated` extents, so the two lists never drift apart.
    pub fn mark_allocated(
        &mut self,
        pv: usize,
        phys_start: u64,
        count: u64,
        lv: usize,
        logical_start: u64,
        provenance: Option<Provenance>,
    ) -> Result<(), StoreError> {
        self.physical_volume(pv)?;
        self.logical_volume(lv)?;

        let extent = Extent::Allocated {
            pv,
            phys_start,
            phys_count: count,
            lv,
            logical_start,
            provenance,
        };
        insert_sorted(&mut self.physical_volumes[pv].extents, extent.clone(), phys_start_key);
        insert_sorted(&mut self.logical_volumes[lv].extents, extent, logical_start_key);
        Ok(())
    }

    /// The extent whose `[phys_start, phys_start+phys_count)` contains
    /// `block_number`, exploiting sorted order to stop early.
    pub fn find_physical_extent(&self, pv: usize, block_number: u64) -> Option<&Extent> {
        let volume = self.physical_volumes.get(pv)?;
        for extent in &volume.extents {
            let (start, end) = extent.phys_range()?;
            if start > block_number {
                break;
            }
            if start <= block_number && block_number < end {
                return Some(extent);
            }
        }
        None
    }

    /// Symmetric on the lv-list: the half-open window uses `phys_count`
    /// since logical length equals physical length for an `Allocated` extent.
    pub fn find_logical_extent(&self, lv: usize, block_number: u64) -> Option<&Extent> {
        let volume = self.logical_volumes.get(lv)?;
        for extent in &volume.extents {
            let Extent::Allocated { logical_start, phys_count, .. } = extent else {
                continue;
            };
            if *logical_start > block_number {
                break;
            }
            if *logical_start <= block_number && block_number < logical_start + phys_count {
                return Some(extent);
            }
        }
        None
    }

    /// The first stored extent overlapping `[start, start+count)`, or
    /// `None`; early-exits once `phys_start >= start + count`.
    pub fn check_overlap(&self, pv: usize, start: u64, count: u64) -> Option<&Extent> {
        let volume = self.physical_volumes.get(pv)?;
        for extent in &volume.extents {
            let Some(phys_start) = extent.phys_start() else {
                continue;
            };
            if phys_start >= start + count {
                break;
            }
            if extent.overlaps(start, count) {
                return Some(extent);
            }
        }
        None
    }

    /// Derive per-pv and per-lv block totals purely from the extent lists
    /// (spec.md I5). Idempotent; callers may call this as often as needed.
    pub fn recompute_statistics(&self) -> Statistics {
        let physical = self
            .physical_volumes
            .iter()
            .map(|pv| {
                let mut stats = PhysicalVolumeStats::default();
                for extent in &pv.extents {
                    match extent {
                        Extent::Reserved { phys_count, .. } => stats.reserved_blocks += phys_count,
                        Extent::Allocated { phys_count, .. } => stats.allocated_blocks += phys_count,
                        Extent::Free { phys_count, .. } => stats.free_blocks += phys_count,
                        Extent::Unknown => {}
                    }
                }
                stats
            })
            .collect();

        let logical = self
            .logical_volumes
            .iter()
            .map(|lv| {
                let mapped_blocks: u64 = lv.extents.iter().filter_map(Extent::phys_count).sum();
                let unmapped_blocks = lv.size_in_blocks.saturating_sub(mapped_blocks);
                LogicalVolumeStats { mapped_blocks, unmapped_blocks }
            })
            .collect();

        Statistics { physical, logical }
    }
}
