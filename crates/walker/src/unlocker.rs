// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use fvde_types::{UnlockedLogicalVolume, UnlockedPhysicalVolume};

/// The external contract consumed by `walk` (spec.md §6.1): FVDE unlock
/// itself — deriving keys from credentials or an EncryptedRoot plist — is
/// out of scope for this core. An `Unlocker` hands back already-unlocked
/// volume facts; `walk` does its own Core Storage layout parsing (via
/// `fvde-codec`) by opening each physical volume's `source_path` directly,
/// since that parsing is squarely in scope (spec.md §1).
pub trait Unlocker {
    fn physical_volumes(&self) -> &[UnlockedPhysicalVolume];
    fn logical_volumes(&self) -> &[UnlockedLogicalVolume];
}

/// Requested traversal order for logical volumes (spec.md §6.6 `--order`).
///
/// Parsed from the CLI and carried on [`crate::WalkOptions`], but per
/// spec.md §9 ("Processing-order and stop-at options") the walker always
/// processes logical volumes in the Unlocker's own enumeration order —
/// these variants are accepted and echoed back in the report, never acted
/// on. Do not infer behavior from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingOrder {
    #[default]
    Ascending,
    Descending,
    Physical,
}

impl std::str::FromStr for ProcessingOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" => Ok(Self::Ascending),
            "descending" => Ok(Self::Descending),
            "physical" => Ok(Self::Physical),
            other => Err(format!("unknown processing order {other:?}")),
        }
    }
}

impl std::fmt::Display for ProcessingOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
            Self::Physical => "physical",
        };
        f.write_str(s)
    }
}

/// A requested early-stop condition for `check` (spec.md §9), parsed but
/// inert for the same reason as [`ProcessingOrder`]: the walker always
/// runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopCondition {
    #[default]
    None,
    AfterLogicalVolumeCount(usize),
}

/// Options accepted by `walk`. See [`ProcessingOrder`] and
/// [`StopCondition`] for which of these actually influence the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    pub order: ProcessingOrder,
    pub stop: StopCondition,
}
