//! BLS signing seam.
//!
//! Thin wrappers over `blst` (min-pk scheme: 48-byte public keys, 96-byte
//! signatures) exposing exactly the contract the node needs: sign a 32-byte
//! root, verify a signature over a 32-byte root. Curve math stays inside
//! `blst`; the wrappers only carry bytes and the SSZ/tree-hash impls the
//! beacon containers require.

use std::fmt;

use blst::{BLST_ERROR, min_pk};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tree_hash::{PackedEncoding, TreeHash, TreeHashType};

/// Domain separation tag for the proof-of-possession BLS ciphersuite.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

pub const BLS_PUBLIC_KEY_BYTES: usize = 48;
pub const BLS_SIGNATURE_BYTES: usize = 96;

/// Compressed BLS12-381 G1 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlsPublicKey(pub [u8; BLS_PUBLIC_KEY_BYTES]);

/// Compressed BLS12-381 G2 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlsSignature(pub [u8; BLS_SIGNATURE_BYTES]);

/// Secret key handle. Never serialized; loaded from the validator keystore at
/// startup and dropped with the process.
pub struct BlsSecretKey(min_pk::SecretKey);

impl BlsPublicKey {
    pub const fn new(bytes: [u8; BLS_PUBLIC_KEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; BLS_PUBLIC_KEY_BYTES] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let array: [u8; BLS_PUBLIC_KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| format!("invalid public key length: {}", bytes.len()))?;
        Ok(Self(array))
    }
}

impl BlsSignature {
    pub const fn new(bytes: [u8; BLS_SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    pub const fn empty() -> Self {
        let mut bytes = [0u8; BLS_SIGNATURE_BYTES];
        // Compressed point-at-infinity marker.
        bytes[0] = 0xc0;
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; BLS_SIGNATURE_BYTES] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let array: [u8; BLS_SIGNATURE_BYTES] = bytes
            .try_into()
            .map_err(|_| format!("invalid signature length: {}", bytes.len()))?;
        Ok(Self(array))
    }

    /// Verify this signature over `message` (normally a signing root) with
    /// `public_key`. Malformed points verify as `false`, never as an error:
    /// a garbage signature is simply an invalid one.
    pub fn verify(&self, public_key: &BlsPublicKey, message: &[u8]) -> bool {
        let Ok(sig) = min_pk::Signature::from_bytes(&self.0) else {
            return false;
        };
        let Ok(pk) = min_pk::PublicKey::from_bytes(&public_key.0) else {
            return false;
        };
        sig.verify(true, message, DST, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
    }
}

impl BlsSecretKey {
    /// Derive a secret key from 32+ bytes of key material.
    pub fn from_ikm(ikm: &[u8]) -> Result<Self, String> {
        min_pk::SecretKey::key_gen(ikm, &[])
            .map(Self)
            .map_err(|e| format!("BLS key generation failed: {e:?}"))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        min_pk::SecretKey::from_bytes(bytes)
            .map(Self)
            .map_err(|e| format!("invalid BLS secret key: {e:?}"))
    }

    pub fn public_key(&self) -> BlsPublicKey {
        BlsPublicKey(self.0.sk_to_pk().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.0.sign(message, DST, &[]).to_bytes())
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsPublicKey(0x{})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlsSignature(0x{})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for BlsSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlsSecretKey(<redacted>)")
    }
}

impl Default for BlsSignature {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for BlsPublicKey {
    fn default() -> Self {
        Self([0u8; BLS_PUBLIC_KEY_BYTES])
    }
}

/// SSZ, tree-hash and serde impls for fixed-size byte newtypes. Shared with
/// the KZG wrappers in `blob`.
macro_rules! impl_fixed_bytes_codecs {
    ($type:ty, $len:expr) => {
        impl ssz::Encode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn ssz_bytes_len(&self) -> usize {
                $len
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(&self.0);
            }
        }

        impl ssz::Decode for $type {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $len
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
                if bytes.len() != $len {
                    return Err(ssz::DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $len,
                    });
                }
                let mut array = [0u8; $len];
                array.copy_from_slice(bytes);
                Ok(Self(array))
            }
        }

        impl TreeHash for $type {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> PackedEncoding {
                unreachable!("vectors are not packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("vectors are not packed")
            }

            fn tree_hash_root(&self) -> tree_hash::Hash256 {
                // Fixed byte vector: chunk into 32-byte leaves and merkleize.
                tree_hash::merkle_root(&self.0, 0)
            }
        }

        impl Serialize for $type {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
            }
        }

        impl<'de> Deserialize<'de> for $type {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
                    .map_err(serde::de::Error::custom)?;
                Self::from_slice(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use impl_fixed_bytes_codecs;

impl_fixed_bytes_codecs!(BlsPublicKey, BLS_PUBLIC_KEY_BYTES);
impl_fixed_bytes_codecs!(BlsSignature, BLS_SIGNATURE_BYTES);
