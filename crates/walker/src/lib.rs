// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Drives an unlocked Core Storage / FVDE volume into a populated
//! `fvde_store::VolumeState` (spec.md §4.C).

mod errors;
mod unlocker;
mod walk;

pub use errors::WalkError;
pub use unlocker::{ProcessingOrder, StopCondition, Unlocker, WalkOptions};
pub use walk::{walk, WalkReport};
