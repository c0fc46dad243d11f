//! Content fingerprints used as cache keys.
//!
//! A [`Fingerprint`] is a SHA-256 digest over the output-affecting state of a
//! value. Every field is written with an explicit length prefix so that
//! adjacent strings cannot alias (`"ab" + "c"` vs `"a" + "bc"`), and floats
//! are hashed by bit pattern.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A 256-bit content hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding (64 characters).
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            s.push_str(&format!("{:02x}", b));
        }
        s
    }

    /// Fingerprint of an arbitrary byte string.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut builder = FingerprintBuilder::new("bytes");
        builder.bytes(bytes);
        builder.finish()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Incremental builder for a [`Fingerprint`].
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    /// Start a fingerprint in the given domain (e.g. `"region"`).
    pub fn new(domain: &str) -> Self {
        let mut builder = Self { hasher: Sha256::new() };
        builder.str(domain);
        builder
    }

    /// Write raw bytes (length-prefixed).
    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    /// Write a string (length-prefixed).
    pub fn str(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    /// Write an unsigned integer.
    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(v.to_le_bytes());
        self
    }

    /// Write a float by bit pattern, with `-0.0` written as `0.0`.
    pub fn f64(&mut self, v: f64) -> &mut Self {
        let v = if v == 0.0 { 0.0 } else { v };
        self.hasher.update(v.to_bits().to_le_bytes());
        self
    }

    /// Write a boolean.
    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.hasher.update([v as u8]);
        self
    }

    /// Write a sequence of strings (count-prefixed).
    pub fn strs<S: AsRef<str>>(&mut self, items: &[S]) -> &mut Self {
        self.u64(items.len() as u64);
        for item in items {
            self.str(item.as_ref());
        }
        self
    }

    /// Write a previously computed fingerprint.
    pub fn fingerprint(&mut self, fp: &Fingerprint) -> &mut Self {
        self.hasher.update(fp.0);
        self
    }

    /// Write the state of a nested fingerprinted value.
    pub fn nested<T: Fingerprinted + ?Sized>(&mut self, value: &T) -> &mut Self {
        value.write_fingerprint(self);
        self
    }

    /// Finalize the digest.
    pub fn finish(self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().into())
    }
}

/// Types whose output-affecting state can be fingerprinted.
///
/// Implementations must write *only* fields that change computed results;
/// cosmetic fields (labels, colors) are excluded so equivalently-computing
/// values share cache entries.
pub trait Fingerprinted {
    /// Write this value's state into `fp`.
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder);

    /// Compute the standalone fingerprint of this value.
    fn fingerprint(&self) -> Fingerprint {
        let mut fp = FingerprintBuilder::new("value");
        self.write_fingerprint(&mut fp);
        fp.finish()
    }
}

impl<T: Fingerprinted + ?Sized> Fingerprinted for std::sync::Arc<T> {
    fn write_fingerprint(&self, fp: &mut FingerprintBuilder) {
        (**self).write_fingerprint(fp)
    }

    fn fingerprint(&self) -> Fingerprint {
        (**self).fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_prevents_aliasing() {
        let mut a = FingerprintBuilder::new("t");
        a.str("ab").str("c");
        let mut b = FingerprintBuilder::new("t");
        b.str("a").str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn deterministic_and_hex_encoded() {
        let x = Fingerprint::of_bytes(b"hello");
        let y = Fingerprint::of_bytes(b"hello");
        assert_eq!(x, y);
        assert_eq!(x.to_hex().len(), 64);
        assert!(x.to_hex().chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(x, Fingerprint::of_bytes(b"hello!"));
    }

    #[test]
    fn domain_separates_equal_payloads() {
        let mut a = FingerprintBuilder::new("region");
        a.str("x");
        let mut b = FingerprintBuilder::new("process");
        b.str("x");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn signed_zeros_hash_equal() {
        let mut a = FingerprintBuilder::new("t");
        a.f64(-0.0);
        let mut b = FingerprintBuilder::new("t");
        b.f64(0.0);
        let zero = b.finish();
        assert_eq!(a.finish(), zero);
        let mut c = FingerprintBuilder::new("t");
        c.f64(1e-300);
        assert_ne!(zero, c.finish());
    }
}
