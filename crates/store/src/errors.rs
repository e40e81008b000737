// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

/// Leaf error type for `fvde-store`. spec.md §4.B: "out-of-range pv/lv
/// indices fail with `OutOfBounds`; allocation failures are fatal. No
/// recovery path." — these map onto `fvde_types::ErrorKind::InvalidArgument`
/// and `CapacityExceeded` respectively at the call site.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("physical volume index {index} out of bounds ({len} physical volumes present)")]
    PhysicalVolumeOutOfBounds { index: usize, len: usize },

    #[error("logical volume index {index} out of bounds ({len} logical volumes present)")]
    LogicalVolumeOutOfBounds { index: usize, len: usize },

    #[error("capacity exceeded: at most {MAX_VOLUMES} physical volumes are supported")]
    PhysicalVolumeCapacityExceeded,

    #[error("capacity exceeded: at most {MAX_VOLUMES} logical volumes are supported")]
    LogicalVolumeCapacityExceeded,
}

pub use crate::MAX_VOLUMES;
