// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Kernel keyring insertion (spec.md §6.4): a `logon`-type key named
//! `fvde:<uuid>` holding the 48-byte `master_key ‖ tweak_key` payload,
//! added atomically to a caller-selected keyring.

use keyutils::keytypes::Logon;
use keyutils::{Keyring, SpecialKeyring};

use crate::errors::CliError;

/// Payload buffer (48 bytes = master_key ‖ tweak_key) that zeroes itself on
/// drop, so it doesn't outlive the keyring insertion it was built for
/// (spec.md §5's key-material lifetime rule applies to this buffer just as
/// much as the `VolumeMasterKey`/`VolumeTweakKey` it was assembled from).
type KeyringPayload = fvde_types::KeyMaterial<48>;

fn resolve_keyring(selector: &str) -> Result<Keyring, CliError> {
    let special = match selector {
        "@s" => SpecialKeyring::Session,
        "@u" => SpecialKeyring::User,
        "@us" => SpecialKeyring::UserSession,
        other => {
            let id: i32 = other
                .parse()
                .map_err(|_| CliError::InvalidArgument(format!("unknown keyring {other:?} (expected @s, @u, @us, or a numeric id)")))?;
            return Keyring::from_special_id(keyutils::Permission::empty(), id)
                .map_err(|e| CliError::Keyring(format!("attaching to keyring {id}: {e}")));
        }
    };
    Keyring::attach_or_create(special).map_err(|e| CliError::Keyring(format!("attaching to keyring {selector}: {e}")))
}

/// Insert a 48-byte (`master_key ‖ tweak_key`) payload as a `logon` key
/// described `fvde:<uuid>` into the keyring named by `selector`.
pub fn insert(selector: &str, uuid: &str, master_key: &[u8; 16], tweak_key: &[u8; 32]) -> Result<(), CliError> {
    let mut keyring = resolve_keyring(selector)?;

    let mut raw = [0u8; 48];
    raw[..16].copy_from_slice(master_key);
    raw[16..].copy_from_slice(tweak_key);
    let payload = KeyringPayload::new(raw);

    let description = format!("fvde:{uuid}");
    keyring
        .add_key::<Logon, _, _>(&description, payload.as_bytes())
        .map(|_| ())
        .map_err(|e| CliError::Keyring(format!("adding key {description:?}: {e}")))
}
