// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Shared data model and error taxonomy for the FVDE forensic toolkit.
//!
//! This crate carries only plain data and the cross-crate error type:
//! the extent model (`Extent`, `Provenance`, `SegmentDescriptor`), the
//! Unlocker's output data (`UnlockedPhysicalVolume`, `UnlockedLogicalVolume`,
//! key material), and `Error`/`ErrorKind`. Parsing, allocation-state
//! bookkeeping and device driving live in `fvde-codec`, `fvde-store` and
//! `fvde-walker` respectively.

mod abort;
mod errors;
mod extent;
mod unlocked;

pub use abort::AbortFlag;
pub use errors::*;
pub use extent::*;
pub use unlocked::*;
