use std::fmt;

use serde::{Deserialize, Serialize};

use crate::function::{DigestFunction, Function};
use crate::instance_name::InstanceName;

/// Wire representation of a digest, as carried by requests and tree messages.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct DigestProto {
    /// Lowercase hexadecimal hash.
    pub hash: String,
    /// Size of the blob in bytes.
    pub size_bytes: i64,
}

impl DigestProto {
    /// Creates a wire digest.
    #[must_use]
    pub fn new(hash: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            hash: hash.into(),
            size_bytes,
        }
    }
}

/// Validated identifier of a blob stored in the Content Addressable Storage.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Digest {
    function: Function,
    hash: String,
    size_bytes: i64,
}

impl Digest {
    pub(crate) const fn from_parts(function: Function, hash: String, size_bytes: i64) -> Self {
        Self {
            function,
            hash,
            size_bytes,
        }
    }

    /// Returns the lowercase hexadecimal hash.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns the size of the blob in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    /// Returns the function that produced this digest.
    #[must_use]
    pub const fn function(&self) -> &Function {
        &self.function
    }

    /// Returns the instance name the blob belongs to.
    #[must_use]
    pub fn instance_name(&self) -> &InstanceName {
        self.function.instance_name()
    }

    /// Returns the hashing algorithm of the digest.
    #[must_use]
    pub const fn digest_function(&self) -> DigestFunction {
        self.function.digest_function()
    }

    /// Reports whether the digest was produced by `function`, meaning both
    /// the hashing algorithm and the instance name match.
    #[must_use]
    pub fn uses_digest_function(&self, function: &Function) -> bool {
        self.function == *function
    }

    /// Converts the digest to its wire representation.
    #[must_use]
    pub fn to_proto(&self) -> DigestProto {
        DigestProto::new(self.hash.clone(), self.size_bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.hash,
            self.size_bytes,
            self.instance_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(instance: &str, digest_function: DigestFunction) -> Function {
        Function::new(
            InstanceName::new(instance).expect("instance name"),
            digest_function,
        )
    }

    #[test]
    fn uses_digest_function_compares_instance_and_algorithm() {
        let main = function("main", DigestFunction::Sha256);
        let digest = main.compute(b"payload");

        assert!(digest.uses_digest_function(&main));
        assert!(!digest.uses_digest_function(&function("other", DigestFunction::Sha256)));
        assert!(!digest.uses_digest_function(&function("main", DigestFunction::Sha1)));
    }

    #[test]
    fn display_includes_instance_name() {
        let digest = function("main", DigestFunction::Md5).compute(b"");
        assert_eq!(
            digest.to_string(),
            "d41d8cd98f00b204e9800998ecf8427e-0-main"
        );
    }

    #[test]
    fn proto_serializes_as_json_object() {
        let proto = DigestProto::new("aa", 2);
        let json = serde_json::to_string(&proto).expect("serialize");
        assert_eq!(json, r#"{"hash":"aa","size_bytes":2}"#);
    }
}
