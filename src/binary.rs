//! Binary payload materialization.
//!
//! A connection's [`BinaryType`] decides which concrete representation the
//! caller receives for binary messages and for ping/pong payloads. The set of
//! representations is closed: assigning an unknown name by string fails and
//! leaves the current setting untouched.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};

/// Representation used for binary payloads handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryType {
    /// Mutable, growable byte buffer ([`BytesMut`]). Named `"nodebuffer"`.
    #[default]
    Buffer,
    /// Immutable, fixed-size byte buffer ([`Bytes`]). Named `"arraybuffer"`.
    ArrayBuffer,
}

impl BinaryType {
    /// All recognized binary types.
    pub const ALL: [BinaryType; 2] = [BinaryType::Buffer, BinaryType::ArrayBuffer];

    /// Canonical name of this binary type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            BinaryType::Buffer => "nodebuffer",
            BinaryType::ArrayBuffer => "arraybuffer",
        }
    }

    /// Materialize `payload` in this representation.
    #[must_use]
    pub fn materialize(self, payload: Vec<u8>) -> BinaryData {
        match self {
            BinaryType::Buffer => BinaryData::Buffer(BytesMut::from(&payload[..])),
            BinaryType::ArrayBuffer => BinaryData::ArrayBuffer(Bytes::from(payload)),
        }
    }
}

impl FromStr for BinaryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BinaryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidBinaryType(s.to_owned()))
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary payload materialized according to a [`BinaryType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryData {
    /// Mutable buffer, produced by [`BinaryType::Buffer`].
    Buffer(BytesMut),
    /// Immutable buffer, produced by [`BinaryType::ArrayBuffer`].
    ArrayBuffer(Bytes),
}

impl BinaryData {
    /// The binary type this value was materialized with.
    #[must_use]
    pub const fn binary_type(&self) -> BinaryType {
        match self {
            BinaryData::Buffer(_) => BinaryType::Buffer,
            BinaryData::ArrayBuffer(_) => BinaryType::ArrayBuffer,
        }
    }

    /// Borrow the payload bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            BinaryData::Buffer(buf) => buf,
            BinaryData::ArrayBuffer(buf) => buf,
        }
    }

    /// Convert into an immutable [`Bytes`] regardless of representation.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            BinaryData::Buffer(buf) => buf.freeze(),
            BinaryData::ArrayBuffer(buf) => buf,
        }
    }

    /// Copy the payload into a `Vec<u8>`.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns the mutable buffer, if this is a [`BinaryData::Buffer`].
    #[must_use]
    pub fn as_buffer_mut(&mut self) -> Option<&mut BytesMut> {
        match self {
            BinaryData::Buffer(buf) => Some(buf),
            BinaryData::ArrayBuffer(_) => None,
        }
    }
}

impl Deref for BinaryData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for BinaryData {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl PartialEq<[u8]> for BinaryData {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for BinaryData {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl<const N: usize> PartialEq<[u8; N]> for BinaryData {
    fn eq(&self, other: &[u8; N]) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl PartialEq<Vec<u8>> for BinaryData {
    fn eq(&self, other: &Vec<u8>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_buffer() {
        assert_eq!(BinaryType::default(), BinaryType::Buffer);
    }

    #[test]
    fn test_from_str_recognized() {
        assert_eq!("nodebuffer".parse::<BinaryType>().unwrap(), BinaryType::Buffer);
        assert_eq!(
            "arraybuffer".parse::<BinaryType>().unwrap(),
            BinaryType::ArrayBuffer
        );
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        for name in ["blob", "fragments", "", "ArrayBuffer", " arraybuffer"] {
            assert!(matches!(
                name.parse::<BinaryType>(),
                Err(Error::InvalidBinaryType(ref s)) if s == name
            ));
        }
    }

    #[test]
    fn test_display_roundtrip() {
        for t in BinaryType::ALL {
            assert_eq!(t.to_string().parse::<BinaryType>().unwrap(), t);
        }
    }

    #[test]
    fn test_materialize_buffer() {
        let data = BinaryType::Buffer.materialize(vec![1, 2, 3]);
        assert!(matches!(data, BinaryData::Buffer(_)));
        assert_eq!(data.binary_type(), BinaryType::Buffer);
        assert_eq!(data, [1u8, 2, 3]);
    }

    #[test]
    fn test_materialize_array_buffer() {
        let data = BinaryType::ArrayBuffer.materialize(vec![0xff, 0x00]);
        assert!(matches!(data, BinaryData::ArrayBuffer(_)));
        assert_eq!(data.as_slice(), &[0xff, 0x00]);
    }

    #[test]
    fn test_materialize_empty() {
        for t in BinaryType::ALL {
            let data = t.materialize(Vec::new());
            assert!(data.is_empty());
            assert_eq!(data.binary_type(), t);
        }
    }

    #[test]
    fn test_buffer_is_mutable() {
        let mut data = BinaryType::Buffer.materialize(b"abc".to_vec());
        data.as_buffer_mut().unwrap().extend_from_slice(b"def");
        assert_eq!(data, *b"abcdef");

        let mut data = BinaryType::ArrayBuffer.materialize(b"abc".to_vec());
        assert!(data.as_buffer_mut().is_none());
    }

    #[test]
    fn test_into_bytes() {
        let data = BinaryType::Buffer.materialize(b"xyz".to_vec());
        assert_eq!(data.into_bytes(), Bytes::from_static(b"xyz"));
    }
}
