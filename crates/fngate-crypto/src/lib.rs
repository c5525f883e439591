// crates/fngate-crypto/src/lib.rs

//! Crypto substrate for the function gateway.
//!
//! - [`Digest`]: an opaque, fixed-width 32-byte content hash used both as
//!   identity (request/function ids) and as integrity binding (input, output,
//!   context hashes).
//! - [`Digester`]: the hash algorithm seam. The gateway never assumes a
//!   concrete algorithm; [`Sha256Digester`] is the default and
//!   [`Blake3Digester`] is a drop-in alternative.
//! - [`list_root`]: the flat "root" digest over an ordered list of digests
//!   used by batch fulfillment.
//! - [`transcript`]: a domain-separated BLAKE3 transcript used by the
//!   reference verification capability.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::module_name_repetitions)]

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Fiat–Shamir style transcript (BLAKE3, domain separated).
pub mod transcript;

pub use transcript::{Blake3Transcript, Label, Transcript};

/// Width of every digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Opaque 32-byte digest.
///
/// `Digest::ZERO` doubles as "absent" (e.g. an output hash before a proof is
/// accepted). Human-readable encodings (JSON, TOML, logs) render lowercase
/// hex; binary encodings (CBOR) carry the raw bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The all-zero digest.
    pub const ZERO: Self = Self([0u8; DIGEST_LEN]);

    /// Wrap raw bytes.
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex, no prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse 64 hex chars, with or without a leading `0x`.
    pub fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|_| DigestParseError::InvalidHex)?;
        let arr: [u8; DIGEST_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DigestParseError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Failure to parse a hex digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestParseError {
    /// Input is not valid hex.
    InvalidHex,
    /// Input decoded to the wrong number of bytes.
    InvalidLength(usize),
}

impl fmt::Display for DigestParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHex => f.write_str("digest is not valid hex"),
            Self::InvalidLength(n) => write!(f, "digest must be {DIGEST_LEN} bytes, got {n}"),
        }
    }
}

impl std::error::Error for DigestParseError {}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct DigestVisitor;

impl<'de> Visitor<'de> for DigestVisitor {
    type Value = Digest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {DIGEST_LEN}-byte digest as hex string or bytes")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Digest::from_hex(v).map_err(E::custom)
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        let arr: [u8; DIGEST_LEN] = v
            .try_into()
            .map_err(|_| E::invalid_length(v.len(), &self))?;
        Ok(Digest(arr))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut arr = [0u8; DIGEST_LEN];
        for (i, slot) in arr.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(Digest(arr))
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(DigestVisitor)
        } else {
            deserializer.deserialize_bytes(DigestVisitor)
        }
    }
}

/// A collision-resistant hash algorithm producing [`Digest`]s.
///
/// Implementors are stateless markers used as type parameters, e.g.
/// `FunctionGateway::<Sha256Digester>::new(..)`.
pub trait Digester: Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// Short algorithm name for logs and snapshots.
    const NAME: &'static str;

    /// Hash the concatenation of `parts` (no implicit framing).
    fn digest_parts(parts: &[&[u8]]) -> Digest;

    /// Hash a single byte string.
    #[inline]
    fn digest(data: &[u8]) -> Digest {
        Self::digest_parts(&[data])
    }
}

/// SHA-256 (the gateway default).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    const NAME: &'static str = "sha256";

    fn digest_parts(parts: &[&[u8]]) -> Digest {
        use sha2::Digest as _;
        let mut h = sha2::Sha256::new();
        for p in parts {
            h.update(p);
        }
        Digest(h.finalize().into())
    }
}

/// BLAKE3 (256-bit output).
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Digester;

impl Digester for Blake3Digester {
    const NAME: &'static str = "blake3";

    fn digest_parts(parts: &[&[u8]]) -> Digest {
        let mut h = blake3::Hasher::new();
        for p in parts {
            h.update(p);
        }
        Digest(*h.finalize().as_bytes())
    }
}

/// Flat root over an ordered digest list: `H(d_0 ‖ d_1 ‖ … ‖ d_{n-1})`.
///
/// Order matters; an empty list hashes the empty string.
#[must_use]
pub fn list_root<H: Digester>(items: &[Digest]) -> Digest {
    let parts: Vec<&[u8]> = items.iter().map(|d| d.0.as_slice()).collect();
    H::digest_parts(&parts)
}
