use data_encoding::HEXLOWER;
use thiserror::Error;

/// Length in bytes of a BLAKE3 digest.
pub const B3_LEN: usize = 32;

/// Length in ASCII characters of a digest's lowercase hex encoding.
pub const B3_HEX_LEN: usize = B3_LEN * 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLen(usize),
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),
}

/// A BLAKE3 content digest, always exactly [B3_LEN] bytes.
///
/// Assets are addressed by the lowercase hex encoding of this value, so
/// [B3Digest] carries its own hex codec rather than leaving that to callers.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
pub struct B3Digest([u8; B3_LEN]);

impl B3Digest {
    pub fn as_bytes(&self) -> &[u8; B3_LEN] {
        &self.0
    }

    /// Lowercase hex encoding, the on-disk and wire representation.
    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }

    /// Parses a 64-character lowercase hex string into a digest.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        if s.len() != B3_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidHex(s.to_string()));
        }
        let decoded = HEXLOWER
            .decode(s.as_bytes())
            .map_err(|_| Error::InvalidHex(s.to_string()))?;
        Self::try_from(decoded)
    }
}

impl From<blake3::Hash> for B3Digest {
    fn from(value: blake3::Hash) -> Self {
        Self(*value.as_bytes())
    }
}

impl From<[u8; B3_LEN]> for B3Digest {
    fn from(value: [u8; B3_LEN]) -> Self {
        Self(value)
    }
}

impl TryFrom<Vec<u8>> for B3Digest {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        let len = value.len();
        let arr: [u8; B3_LEN] = value
            .try_into()
            .map_err(|_| Error::InvalidDigestLen(len))?;
        Ok(Self(arr))
    }
}

impl TryFrom<&[u8]> for B3Digest {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() != B3_LEN {
            return Err(Error::InvalidDigestLen(value.len()));
        }
        let mut arr = [0u8; B3_LEN];
        arr.copy_from_slice(value);
        Ok(Self(arr))
    }
}

impl From<B3Digest> for [u8; B3_LEN] {
    fn from(value: B3Digest) -> Self {
        value.0
    }
}

impl std::fmt::Display for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for B3Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "B3Digest({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use rstest::rstest;

    #[test]
    fn hex_roundtrip() {
        let digest: B3Digest = blake3::hash(b"hello\n").into();
        let hex = digest.to_hex();
        assert_eq!(hex.len(), B3_HEX_LEN);
        let parsed = B3Digest::from_hex(&hex).expect("valid hex");
        assert_eq!(digest, parsed);
    }

    #[test]
    fn known_vector_matches_blake3_of_empty_input() {
        let expected: [u8; B3_LEN] =
            hex!("af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f326");
        let digest = B3Digest::from(expected);
        assert_eq!(blake3::hash(b"").as_bytes(), &<[u8; B3_LEN]>::from(digest));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(10)]
    #[case(31)]
    #[case(33)]
    #[case(64)]
    fn rejects_wrong_length(#[case] len: usize) {
        assert!(matches!(
            B3Digest::try_from(vec![0u8; len]),
            Err(Error::InvalidDigestLen(l)) if l == len
        ));
    }

    #[test]
    fn rejects_wrong_hex_length() {
        assert!(matches!(
            B3Digest::from_hex("abcd"),
            Err(Error::InvalidHex(_))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "g".repeat(B3_HEX_LEN);
        assert!(matches!(B3Digest::from_hex(&bad), Err(Error::InvalidHex(_))));
    }
}
