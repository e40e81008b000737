// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `fvde dmsetup`: derive per-logical-volume keys after unlock and emit a
//! Linux device-mapper "crypt" table (spec.md §6.3), optionally injecting
//! the keys into the kernel keyring (spec.md §6.4).

use fvde_types::UnlockedLogicalVolume;
use fvde_walker::Unlocker as _;

use crate::args::DmsetupArgs;
use crate::errors::CliError;
use crate::keyring;
use crate::unlock;

const SECTOR_SIZE: u64 = 512;

/// One dmsetup table line for a single unlocked logical volume (spec.md §6.3).
fn table_line(lv: &UnlockedLogicalVolume, source: &str, offset_bytes: u64) -> String {
    let size_in_sectors = lv.size_bytes / SECTOR_SIZE;
    let offset_in_sectors = offset_bytes / SECTOR_SIZE;
    format!(
        "0 {size_in_sectors} crypt aes-xts-plain64 :48:logon:fvde:{} 0 {source} {offset_in_sectors}",
        lv.uuid_string()
    )
}

fn mapper_name(args: &DmsetupArgs, lv: &UnlockedLogicalVolume) -> String {
    args.mapper_name.clone().or_else(|| lv.utf8_name.clone()).unwrap_or_else(|| "fvde".to_string())
}

pub fn run(args: &DmsetupArgs) -> Result<(), CliError> {
    let unlocker = unlock::resolve(&args.source, args.offset, &args.unlock, true)?;
    let logical = unlocker.logical_volumes();

    if logical.is_empty() {
        return Err(CliError::Locked(args.source.display().to_string()));
    }

    let source_str = args.source.display().to_string();

    for (index, lv) in logical.iter().enumerate() {
        if lv.is_locked {
            log::warn!("logical volume {} is locked; skipping", lv.uuid_string());
            continue;
        }

        let line = table_line(lv, &source_str, args.offset);
        let name = format!("{}{}", mapper_name(args, lv), index + 1);

        if args.shell {
            println!("echo \"{line}\" | dmsetup create {name}");
        } else {
            println!("{line}");
        }

        if args.inject_keyring {
            let (Some(master), Some(tweak)) = (&lv.volume_master_key, &lv.volume_tweak_key) else {
                return Err(CliError::Keyring(format!("no key material available for {}", lv.uuid_string())));
            };
            keyring::insert(&args.keyring, &lv.uuid_string(), master.as_bytes(), tweak.as_bytes())?;
        }
    }

    Ok(())
}
