use std::collections::BTreeSet;

use crate::digest_value::Digest;

/// Ordered set of digests without duplicates.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DigestSet {
    items: Vec<Digest>,
}

impl DigestSet {
    /// Returns the empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Returns the digests in ascending order.
    #[must_use]
    pub fn items(&self) -> &[Digest] {
        &self.items
    }

    /// Returns the number of digests in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Reports whether the set contains no digests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Reports whether `digest` is part of the set.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.items.binary_search(digest).is_ok()
    }

    /// Iterates over the digests in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, Digest> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a DigestSet {
    type Item = &'a Digest;
    type IntoIter = std::slice::Iter<'a, Digest>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Digest> for DigestSet {
    fn from_iter<I: IntoIterator<Item = Digest>>(iter: I) -> Self {
        let mut builder = DigestSetBuilder::new();
        for digest in iter {
            builder.add(digest);
        }
        builder.build()
    }
}

/// Accumulates digests before freezing them into a [`DigestSet`].
#[derive(Clone, Debug, Default)]
pub struct DigestSetBuilder {
    items: BTreeSet<Digest>,
}

impl DigestSetBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single digest.
    pub fn add(&mut self, digest: Digest) -> &mut Self {
        self.items.insert(digest);
        self
    }

    /// Adds all digests contained in another set.
    pub fn add_set(&mut self, set: &DigestSet) -> &mut Self {
        self.items.extend(set.items.iter().cloned());
        self
    }

    /// Returns the number of distinct digests added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Reports whether nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Freezes the builder.
    #[must_use]
    pub fn build(self) -> DigestSet {
        DigestSet {
            items: self.items.into_iter().collect(),
        }
    }
}
