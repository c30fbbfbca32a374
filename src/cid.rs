//! Content identifiers.
//!
//! A content identifier is a self-describing hash reference to a byte sequence.
//! Two encodings circulate and both must be tolerated:
//!
//! - **V0** (legacy): 46 base58btc characters beginning with `Qm`
//! - **V1** (current): multibase prefix `b` followed by lower-case base32 of
//!   `version || codec || multihash`
//!
//! Identifiers are compared by their canonical string form only. A V0 and a V1
//! identifier naming the same bytes are different identifiers.
//!
//! ## Local encoding
//!
//! ```text
//! cid = "b" || base32lower(0x01 || 0x55 || 0x12 || 0x20 || sha256(bytes))
//! ```
//!
//! i.e. a CIDv1 with the `raw` codec and a sha2-256 multihash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CID_V1: u64 = 0x01;
const RAW_CODEC: u64 = 0x55;
const SHA2_256: u64 = 0x12;
const SHA2_256_LEN: u64 = 0x20;

const BASE32_PREFIX: char = 'b';
const V0_PREFIX: &str = "Qm";
const V0_LEN: usize = 46;
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// Errors from parsing a content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidError {
    #[error("Empty content identifier")]
    Empty,

    #[error("Invalid content identifier '{value}': {reason}")]
    Invalid { value: String, reason: &'static str },
}

/// Identifier encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CidVersion {
    /// Legacy base58btc encoding (`Qm...`).
    V0,
    /// Current multibase encoding.
    V1,
}

/// Immutable, hash-derived reference to a piece of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Compute the identifier the local node assigns to `data`.
    pub fn for_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);

        let mut raw = Vec::with_capacity(4 + digest.len());
        for value in [CID_V1, RAW_CODEC, SHA2_256, SHA2_256_LEN] {
            write_varint(value, &mut raw);
        }
        raw.extend_from_slice(&digest);

        Self(format!("{}{}", BASE32_PREFIX, encode_base32_lower(&raw)))
    }

    /// Parse an identifier, accepting both V0 and V1 encodings.
    ///
    /// Surrounding whitespace is trimmed; the remainder is kept verbatim as the
    /// canonical form.
    pub fn parse(value: &str) -> Result<Self, CidError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CidError::Empty);
        }

        if value.starts_with(V0_PREFIX) {
            validate_v0(value)?;
        } else if value.starts_with(BASE32_PREFIX) {
            decode_v1(value)?;
        } else {
            return Err(invalid(value, "unsupported multibase prefix"));
        }

        Ok(Self(value.to_string()))
    }

    /// Canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn version(&self) -> CidVersion {
        if self.0.starts_with(V0_PREFIX) {
            CidVersion::V0
        } else {
            CidVersion::V1
        }
    }

    /// Raw multihash bytes (V1 only).
    fn multihash(&self) -> Option<Vec<u8>> {
        match self.version() {
            CidVersion::V0 => None,
            CidVersion::V1 => decode_v1(&self.0).ok().map(|parts| parts.multihash),
        }
    }

    /// The sha2-256 digest this identifier commits to, when it uses sha2-256.
    pub fn sha256_digest(&self) -> Option<[u8; 32]> {
        let multihash = self.multihash()?;
        let mut cursor = multihash.as_slice();
        let code = read_varint(&mut cursor)?;
        let len = read_varint(&mut cursor)?;
        if code != SHA2_256 || len != SHA2_256_LEN || cursor.len() != 32 {
            return None;
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(cursor);
        Some(digest)
    }

    /// Check `data` against this identifier.
    ///
    /// Returns `None` when the identifier cannot be verified locally (legacy
    /// encoding or a hash function other than sha2-256).
    pub fn verify(&self, data: &[u8]) -> Option<bool> {
        let expected = self.sha256_digest()?;
        Some(Sha256::digest(data).as_slice() == expected.as_slice())
    }

    /// Upper-case base32 form of the multihash (V1 only).
    ///
    /// Block stores commonly key content by this derived form rather than the
    /// identifier itself, so the same content may appear under either.
    pub fn derived_block_key(&self) -> Option<String> {
        self.multihash().map(|mh| base32::encode(BASE32, &mh))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = CidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentId {
    type Error = CidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentId> for String {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

struct V1Parts {
    multihash: Vec<u8>,
}

fn invalid(value: &str, reason: &'static str) -> CidError {
    CidError::Invalid {
        value: value.to_string(),
        reason,
    }
}

fn validate_v0(value: &str) -> Result<(), CidError> {
    if value.len() != V0_LEN {
        return Err(invalid(value, "legacy identifiers are 46 characters"));
    }
    if !value.chars().all(|c| BASE58_ALPHABET.contains(c)) {
        return Err(invalid(value, "not base58btc"));
    }
    Ok(())
}

fn decode_v1(value: &str) -> Result<V1Parts, CidError> {
    let body = &value[BASE32_PREFIX.len_utf8()..];
    if body.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid(value, "base32 body must be lower-case"));
    }
    let bytes = base32::decode(BASE32, &body.to_ascii_uppercase())
        .ok_or_else(|| invalid(value, "not base32"))?;

    let mut cursor = bytes.as_slice();
    let version = read_varint(&mut cursor).ok_or_else(|| invalid(value, "truncated version"))?;
    if version != CID_V1 {
        return Err(invalid(value, "unsupported version"));
    }
    read_varint(&mut cursor).ok_or_else(|| invalid(value, "truncated codec"))?;

    let multihash = cursor.to_vec();
    let mut mh = cursor;
    read_varint(&mut mh).ok_or_else(|| invalid(value, "truncated multihash code"))?;
    let len = read_varint(&mut mh).ok_or_else(|| invalid(value, "truncated multihash length"))?;
    if mh.len() as u64 != len {
        return Err(invalid(value, "multihash length mismatch"));
    }

    Ok(V1Parts { multihash })
}

fn encode_base32_lower(data: &[u8]) -> String {
    base32::encode(BASE32, data).to_lowercase()
}

/// Unsigned LEB128, as used by multiformats.
fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(cursor: &mut &[u8]) -> Option<u64> {
    let bytes: &[u8] = *cursor;
    let mut value = 0u64;
    for (i, &byte) in bytes.iter().enumerate().take(9) {
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            *cursor = &bytes[i + 1..];
            return Some(value);
        }
    }
    None
}
