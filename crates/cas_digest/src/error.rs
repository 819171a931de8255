use thiserror::Error;

/// Errors produced while parsing instance names, digest functions or digests.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum DigestError {
    /// The digest function name is not recognised.
    #[error("Unknown digest function {0:?}")]
    UnknownFunction(String),
    /// The instance name contains a component reserved by the REv2 URL scheme.
    #[error("Instance name contains reserved keyword {0:?}")]
    ReservedKeyword(String),
    /// The instance name has a leading, trailing or doubled slash.
    #[error("Instance name {0:?} contains an empty component")]
    EmptyComponent(String),
    /// The hash does not have the length dictated by the digest function.
    #[error("Hash has length {actual}, while {expected} characters were expected")]
    HashLength {
        /// Length of the supplied hash.
        actual: usize,
        /// Length required by the digest function.
        expected: usize,
    },
    /// The hash contains a character that is not lowercase hexadecimal.
    #[error("Non-hexadecimal character in digest hash: {0:?}")]
    InvalidHashCharacter(char),
    /// The size of the blob is negative.
    #[error("Invalid digest size: {0} bytes")]
    NegativeSize(i64),
}
