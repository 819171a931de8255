use std::borrow::Borrow;
use std::fmt;

use crate::error::ResolveError;

/// A single, validated pathname component.
///
/// Components are never empty, never `.` or `..`, and contain neither `/` nor
/// NUL bytes.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Component(String);

impl Component {
    /// Validates `name` as a pathname component.
    pub fn new(name: &str) -> Result<Self, ResolveError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(ResolveError::InvalidComponent(name.to_owned()));
        }
        Ok(Self(name.to_owned()))
    }

    /// Returns the component as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Component {
    type Error = ResolveError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl Borrow<str> for Component {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Component {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
