//! Signing-root computation.
//!
//! Signatures in the beacon domain never cover raw object roots: the root is
//! first bound to a domain (itself derived from the fork version and the
//! genesis validators root) by merkleizing a two-field `SigningData`
//! container. This prevents cross-fork and cross-purpose signature replay.
//!
//! Both containers are two fixed 32-byte chunks, so their hash tree roots are
//! a single `hash32_concat` and are computed directly here.

use ethereum_hashing::hash32_concat;

use crate::{Hash256, chain_spec::Version};

/// `hash_tree_root(ForkData)`, the fork identifier mixed into domains.
///
/// `ForkData = { current_version: Version, genesis_validators_root: Root }`;
/// the 4-byte version is zero-padded to a full chunk per SSZ.
pub fn fork_data_root(current_version: Version, genesis_validators_root: Hash256) -> Hash256 {
    let mut version_chunk = [0u8; 32];
    version_chunk[..4].copy_from_slice(&current_version);
    Hash256::from(hash32_concat(&version_chunk, genesis_validators_root.as_slice()))
}

/// Root actually signed: `hash_tree_root(SigningData { object_root, domain })`.
pub fn compute_signing_root(object_root: Hash256, domain: Hash256) -> Hash256 {
    Hash256::from(hash32_concat(object_root.as_slice(), domain.as_slice()))
}
