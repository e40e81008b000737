// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Volume-header and metadata-block codec for Core Storage / FVDE
//! containers.
//!
//! Pure byte-buffer parsing: nothing here reads a file or a block device.
//! Callers own a `&[u8; 512]` or a metadata-block-sized `&[u8]`/`&mut [u8]`
//! (typically sliced out of a buffer `fvde-walker` or `fvde-dump` read) and
//! this crate decodes, checksums and rewrites within it.

mod crc;
mod errors;
mod header;
mod metadata;

pub use crc::{Digest, WeakCrc32};
pub use errors::CodecError;
use errors::{BadSignatureSnafu, NoDescriptorSnafu, ShortBufferSnafu};
pub use header::{decode_volume_header, encode_volume_header, verify_volume_header_checksum, VolumeHeader, VOLUME_HEADER_LEN};
pub use metadata::{
    decode_metadata_block_header, locate_encrypted_metadata, rewrite_metadata_block, verify_metadata_block_checksum,
    EncryptedMetadataLocation, MetadataBlockHeader, DEFAULT_METADATA_SIZE, METADATA_BLOCK_HEADER_LEN,
};
