// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Forensic tooling for Apple Core Storage / FileVault Drive Encryption volumes.
#[derive(Debug, Parser)]
#[command(name = "fvde", author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Derive per-logical-volume keys and emit a device-mapper crypt table.
    Dmsetup(DmsetupArgs),
    /// Extract structurally significant regions into a sparse or compact image.
    Dump(DumpArgs),
    /// Walk logical volumes' extents and report allocation state.
    Check(CheckArgs),
}

/// Credential flags accepted by every subcommand that may need to unlock a
/// logical volume (spec.md §6.1). Mutually exclusive; at most one applies.
#[derive(Debug, Args, Default)]
pub struct UnlockArgs {
    /// User password.
    #[arg(long)]
    pub password: Option<String>,
    /// Recovery password (shown as e.g. XXXX-XXXX-... in System Preferences).
    #[arg(long)]
    pub recovery_password: Option<String>,
    /// Raw volume master key as 32 hex characters (16 bytes).
    #[arg(long, value_name = "HEX")]
    pub raw_master_key: Option<String>,
    /// Path to an EncryptedRoot.plist.wipekey file.
    #[arg(long, value_name = "PATH")]
    pub encrypted_root_plist: Option<PathBuf>,
}

impl UnlockArgs {
    pub fn is_empty(&self) -> bool {
        self.password.is_none()
            && self.recovery_password.is_none()
            && self.raw_master_key.is_none()
            && self.encrypted_root_plist.is_none()
    }
}

#[derive(Debug, Args)]
pub struct DmsetupArgs {
    /// Path to the Core Storage physical volume (file or block device).
    #[arg(long)]
    pub source: PathBuf,
    /// Byte offset of the volume header within `source` (for partitioned sources).
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    #[command(flatten)]
    pub unlock: UnlockArgs,

    /// Device-mapper target name prefix; defaults to the logical volume's name.
    #[arg(long)]
    pub mapper_name: Option<String>,
    /// Wrap each table line as `echo "..." | dmsetup create <name><N>`.
    #[arg(long)]
    pub shell: bool,
    /// Insert derived keys into the kernel keyring instead of printing them.
    #[arg(long)]
    pub inject_keyring: bool,
    /// Target keyring: `@s` (session), `@u` (user), `@us` (user-session), or a numeric ID.
    #[arg(long, default_value = "@s")]
    pub keyring: String,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Path to the Core Storage physical volume (file or block device).
    #[arg(long)]
    pub source: PathBuf,
    /// Path to the destination image.
    #[arg(long)]
    pub destination: PathBuf,
    /// Byte offset of the volume header within `source`.
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
    /// Repack regions contiguously and rewrite offsets/checksums instead of
    /// copying to original offsets in a sparse file.
    #[arg(long)]
    pub compact: bool,
    /// Select the metadata copy with the highest transaction id for descriptor extraction.
    #[arg(long)]
    pub best_metadata: bool,
    /// Overwrite an existing destination.
    #[arg(long)]
    pub force: bool,
    /// Additionally copy this many bytes of encrypted data past the encrypted metadata.
    #[arg(long, value_name = "N")]
    pub sample_bytes: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Human,
    Map,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    Ascending,
    Descending,
    Physical,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Path to the Core Storage physical volume (file or block device).
    #[arg(long)]
    pub source: PathBuf,
    /// Byte offset of the volume header within `source`.
    #[arg(long, default_value_t = 0)]
    pub offset: u64,

    #[command(flatten)]
    pub unlock: UnlockArgs,

    /// Report form.
    #[arg(long, value_enum, default_value_t = ReportFormat::Human)]
    pub format: ReportFormat,
    /// Include every extent in the allocation map, not just the first 1000.
    #[arg(long)]
    pub verbose: bool,
    /// Convert a 512-byte Linux sector number to an FVDE block and print its state.
    #[arg(long, value_name = "N")]
    pub lookup_linux_sector: Option<u64>,
    /// Requested logical-volume traversal order (parsed but inert, spec.md §9).
    #[arg(long, value_enum, default_value_t = OrderArg::Ascending)]
    pub order: OrderArg,
}
