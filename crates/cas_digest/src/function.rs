use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use digest::Digest as _;

use crate::digest_value::{Digest, DigestProto};
use crate::error::DigestError;
use crate::instance_name::InstanceName;

/// Hashing algorithm used to compute blob digests.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DigestFunction {
    /// MD5 (128 bits).
    Md5,
    /// SHA-1 (160 bits).
    Sha1,
    /// SHA-256 (256 bits).
    Sha256,
    /// SHA-384 (384 bits).
    Sha384,
    /// SHA-512 (512 bits).
    Sha512,
}

impl DigestFunction {
    /// Returns the canonical, upper case name of the algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha384 => "SHA384",
            Self::Sha512 => "SHA512",
        }
    }

    /// Returns the length of a hexadecimal hash produced by the algorithm.
    #[must_use]
    pub const fn hash_length(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha384 => 96,
            Self::Sha512 => 128,
        }
    }

    /// Hashes `data`, returning the lowercase hexadecimal representation.
    #[must_use]
    pub fn hash_hex(self, data: &[u8]) -> String {
        match self {
            Self::Md5 => to_hex(&md5::Md5::digest(data)),
            Self::Sha1 => to_hex(&sha1::Sha1::digest(data)),
            Self::Sha256 => to_hex(&sha2::Sha256::digest(data)),
            Self::Sha384 => to_hex(&sha2::Sha384::digest(data)),
            Self::Sha512 => to_hex(&sha2::Sha512::digest(data)),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

impl FromStr for DigestFunction {
    type Err = DigestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        [
            Self::Md5,
            Self::Sha1,
            Self::Sha256,
            Self::Sha384,
            Self::Sha512,
        ]
        .into_iter()
        .find(|function| function.name().eq_ignore_ascii_case(value))
        .ok_or_else(|| DigestError::UnknownFunction(value.to_owned()))
    }
}

impl fmt::Display for DigestFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest function bound to an instance name.
///
/// Every [`Digest`] records the function that produced it, so that blobs
/// originating from another cluster or hashed with another algorithm can be
/// told apart.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Function {
    instance_name: InstanceName,
    digest_function: DigestFunction,
}

impl Function {
    /// Pairs an instance name with a hashing algorithm.
    #[must_use]
    pub const fn new(instance_name: InstanceName, digest_function: DigestFunction) -> Self {
        Self {
            instance_name,
            digest_function,
        }
    }

    /// Returns the instance name.
    #[must_use]
    pub fn instance_name(&self) -> &InstanceName {
        &self.instance_name
    }

    /// Returns the hashing algorithm.
    #[must_use]
    pub const fn digest_function(&self) -> DigestFunction {
        self.digest_function
    }

    /// Validates a hash and size, producing a digest that uses this function.
    pub fn new_digest(&self, hash: &str, size_bytes: i64) -> Result<Digest, DigestError> {
        let expected = self.digest_function.hash_length();
        if hash.len() != expected {
            return Err(DigestError::HashLength {
                actual: hash.len(),
                expected,
            });
        }
        if let Some(c) = hash
            .chars()
            .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(DigestError::InvalidHashCharacter(c));
        }
        if size_bytes < 0 {
            return Err(DigestError::NegativeSize(size_bytes));
        }
        Ok(Digest::from_parts(self.clone(), hash.to_owned(), size_bytes))
    }

    /// Converts the wire representation of a digest.
    pub fn new_digest_from_proto(&self, proto: &DigestProto) -> Result<Digest, DigestError> {
        self.new_digest(&proto.hash, proto.size_bytes)
    }

    /// Computes the digest of `data`.
    #[must_use]
    pub fn compute(&self, data: &[u8]) -> Digest {
        let size_bytes = i64::try_from(data.len()).unwrap_or(i64::MAX);
        Digest::from_parts(
            self.clone(),
            self.digest_function.hash_hex(data),
            size_bytes,
        )
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.digest_function, self.instance_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha256() -> Function {
        Function::new(InstanceName::default(), DigestFunction::Sha256)
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("sha256".parse::<DigestFunction>(), Ok(DigestFunction::Sha256));
        assert_eq!("MD5".parse::<DigestFunction>(), Ok(DigestFunction::Md5));
        assert!("".parse::<DigestFunction>().is_err());
    }

    #[test]
    fn hash_lengths_match_algorithms() {
        for function in [
            DigestFunction::Md5,
            DigestFunction::Sha1,
            DigestFunction::Sha256,
            DigestFunction::Sha384,
            DigestFunction::Sha512,
        ] {
            assert_eq!(function.hash_hex(b"abc").len(), function.hash_length());
        }
    }

    #[test]
    fn computes_known_sha256() {
        let digest = sha256().compute(b"abc");
        assert_eq!(
            digest.hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.size_bytes(), 3);
    }

    #[test]
    fn computes_known_md5() {
        let function = Function::new(InstanceName::default(), DigestFunction::Md5);
        assert_eq!(
            function.compute(b"").hash(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn new_digest_validates_hash() {
        let function = sha256();
        assert!(matches!(
            function.new_digest("abc", 3),
            Err(DigestError::HashLength { actual: 3, expected: 64 })
        ));
        let upper = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        assert_eq!(
            function.new_digest(upper, 3),
            Err(DigestError::InvalidHashCharacter('B'))
        );
        let lower = upper.to_ascii_lowercase();
        assert_eq!(
            function.new_digest(&lower, -1),
            Err(DigestError::NegativeSize(-1))
        );
        assert_eq!(function.new_digest(&lower, 3), Ok(function.compute(b"abc")));
    }
}
