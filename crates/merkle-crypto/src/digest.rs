use std::fmt;
use std::str::FromStr;

use digest::Digest as _;
use sha2::Sha256;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

const PREFIX: &str = "sha256-";

/// A 32-byte SHA-256 digest, printable as `sha256-<hex>`.
///
/// The all-zero digest is reserved as the sentinel "absent child" value
/// inside interior nodes; it is never returned by [`Digest::of`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

#[derive(Debug, thiserror::Error)]
pub enum DigestParseError {
    #[error("digest string missing `{PREFIX}` prefix")]
    MissingPrefix,
    #[error("digest hex payload is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("digest must be exactly {DIGEST_LEN} bytes, got {0}")]
    WrongLength(usize),
}

impl Digest {
    /// The reserved sentinel meaning "no such child".
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// Computes the SHA-256 digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Builds a digest directly from its raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a digest from a byte slice of the expected length, e.g. a raw
    /// key read back out of an embedded key-value store.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; DIGEST_LEN] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; DIGEST_LEN]
    }

    /// A 5-character tail used only in log lines, never in the wire format.
    pub fn short(&self) -> String {
        let full = self.to_string();
        full[full.len() - 5..].to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_part = s.strip_prefix(PREFIX).ok_or(DigestParseError::MissingPrefix)?;
        let bytes = hex::decode(hex_part)?;
        let len = bytes.len();
        let array: [u8; DIGEST_LEN] = bytes
            .try_into()
            .map_err(|_| DigestParseError::WrongLength(len))?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Digest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Digest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string_form() {
        let digest = Digest::of(b"hello world");
        let printed = digest.to_string();
        assert!(printed.starts_with(PREFIX));
        let parsed: Digest = printed.parse().unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn pinned_vector_e1_leaf_digest() {
        // leaf object = kind tag 0x02 followed by the single payload byte 0x01
        let digest = Digest::of(&[0x02, 0x01]);
        assert_eq!(
            digest.to_string(),
            "sha256-25dfd29c09617dcc9852281c030e5b3037a338a4712a42a21c907f259c6412a0"
        );
    }

    #[test]
    fn zero_is_the_sentinel() {
        assert!(Digest::ZERO.is_zero());
        assert_ne!(Digest::of(b""), Digest::ZERO);
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(matches!(
            "deadbeef".parse::<Digest>(),
            Err(DigestParseError::MissingPrefix)
        ));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let digest = Digest::of(b"hello");
        assert_eq!(Digest::from_slice(digest.as_bytes()), Some(digest));
        assert_eq!(Digest::from_slice(&[0u8; 31]), None);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "sha256-deadbeef".parse::<Digest>(),
            Err(DigestParseError::WrongLength(_))
        ));
    }
}
