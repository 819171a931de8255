use std::fmt;

use crate::error::DigestError;
use crate::function::{DigestFunction, Function};

/// Components that cannot appear in an instance name, as they would make
/// REv2 resource names ambiguous.
const RESERVED_KEYWORDS: [&str; 6] = [
    "actionResults",
    "blobs",
    "capabilities",
    "compressed-blobs",
    "operations",
    "uploads",
];

/// Namespace partitioning a Content Addressable Storage.
///
/// The empty instance name is valid. Non-empty names consist of one or more
/// non-empty components separated by slashes.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstanceName(String);

impl InstanceName {
    /// Validates and wraps an instance name.
    pub fn new(value: &str) -> Result<Self, DigestError> {
        if !value.is_empty() {
            for component in value.split('/') {
                if component.is_empty() {
                    return Err(DigestError::EmptyComponent(value.to_owned()));
                }
                if RESERVED_KEYWORDS.contains(&component) {
                    return Err(DigestError::ReservedKeyword(component.to_owned()));
                }
            }
        }
        Ok(Self(value.to_owned()))
    }

    /// Returns the instance name as it was supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Binds a digest function, given by name, to this instance name.
    ///
    /// Names are matched case-insensitively. `UNKNOWN` and the empty string
    /// are rejected, as there is no hash length to infer the function from.
    pub fn digest_function(&self, name: &str) -> Result<Function, DigestError> {
        let digest_function = name.parse::<DigestFunction>()?;
        Ok(Function::new(self.clone(), digest_function))
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_instance_name_is_valid() {
        let instance = InstanceName::new("").expect("empty name");
        assert_eq!(instance.as_str(), "");
    }

    #[test]
    fn nested_instance_name_is_valid() {
        let instance = InstanceName::new("a/b/c").expect("nested name");
        assert_eq!(instance.to_string(), "a/b/c");
    }

    #[test]
    fn empty_components_are_rejected() {
        for value in ["/a", "a/", "a//b"] {
            assert_eq!(
                InstanceName::new(value),
                Err(DigestError::EmptyComponent(value.to_owned())),
                "{value}"
            );
        }
    }

    #[test]
    fn reserved_keywords_are_rejected() {
        assert_eq!(
            InstanceName::new("main/blobs/x"),
            Err(DigestError::ReservedKeyword("blobs".to_owned()))
        );
    }

    #[test]
    fn digest_function_rejects_unknown_names() {
        let instance = InstanceName::new("main").expect("valid name");
        assert!(matches!(
            instance.digest_function("UNKNOWN"),
            Err(DigestError::UnknownFunction(_))
        ));
        assert!(instance.digest_function("sha256").is_ok());
    }
}
