//! Profile identity keys
//!
//! Every collection is scoped to a [`ProfileId`], an opaque 16-byte key
//! with a canonical hex encoding. The hex form is reversible and doubles
//! as the snapshot filename for that profile's collection.

use crate::error::{HoldingsError, HoldingsResult};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Length of a profile ID in bytes
pub const PROFILE_ID_LEN: usize = 16;

/// Opaque, stable identifier for a dataset owner
///
/// All collection state is partitioned by this key. IDs derived from the
/// same public key are equal across processes and machines.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileId([u8; PROFILE_ID_LEN]);

impl ProfileId {
    /// Wrap raw ID bytes
    pub fn from_bytes(bytes: [u8; PROFILE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a profile ID from a public key
    ///
    /// Takes the leading bytes of the key's SHA-256 digest, so the same
    /// key always maps to the same ID.
    pub fn from_key_digest(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut id = [0u8; PROFILE_ID_LEN];
        id.copy_from_slice(&digest[..PROFILE_ID_LEN]);
        Self(id)
    }

    /// Generate a random profile ID
    pub fn random() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    /// Parse an ID from a raw byte slice
    pub fn from_slice(bytes: &[u8]) -> HoldingsResult<Self> {
        if bytes.len() != PROFILE_ID_LEN {
            return Err(HoldingsError::InvalidProfileId {
                value: hex::encode(bytes),
                reason: format!("expected {} bytes, got {}", PROFILE_ID_LEN, bytes.len()),
            });
        }
        let mut id = [0u8; PROFILE_ID_LEN];
        id.copy_from_slice(bytes);
        Ok(Self(id))
    }

    /// Raw ID bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether this is the all-zero ID
    ///
    /// The zero ID is the unset default and never names a real profile.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; PROFILE_ID_LEN]
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileId({})", hex::encode(self.0))
    }
}

impl FromStr for ProfileId {
    type Err = HoldingsError;

    fn from_str(s: &str) -> HoldingsResult<Self> {
        let bytes = hex::decode(s).map_err(|e| HoldingsError::InvalidProfileId {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes).map_err(|_| HoldingsError::InvalidProfileId {
            value: s.to_string(),
            reason: format!("expected {} hex characters", PROFILE_ID_LEN * 2),
        })
    }
}

impl Serialize for ProfileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProfileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
