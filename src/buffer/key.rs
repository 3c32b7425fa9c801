use std::borrow::Borrow;
use std::hash::{Hash, Hasher};

/// Identity of an aggregation bucket within a subject.
///
/// Equality compares the name by value, so two separately allocated strings
/// with the same contents address the same bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateKey<S> {
    pub name: String,
    pub status: S,
}

impl<S> AggregateKey<S> {
    /// Creates a key for the given observed name and status.
    pub fn new(name: impl Into<String>, status: S) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}

/// Field access shared by owned keys and borrowed lookups.
///
/// Maps keyed by [`AggregateKey`] can be queried through
/// `&dyn KeyView<S>`, which lets lookups skip allocating the name.
pub trait KeyView<S> {
    fn name(&self) -> &str;
    fn status(&self) -> S;
}

/// Borrowed (name, status) pair for map lookups.
#[derive(Debug, Clone, Copy)]
pub struct KeyRef<'a, S> {
    pub name: &'a str,
    pub status: S,
}

impl<'a, S> KeyRef<'a, S> {
    pub fn new(name: &'a str, status: S) -> Self {
        Self { name, status }
    }
}

impl<S: Copy> KeyView<S> for AggregateKey<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> S {
        self.status
    }
}

impl<S: Copy> KeyView<S> for KeyRef<'_, S> {
    fn name(&self) -> &str {
        self.name
    }

    fn status(&self) -> S {
        self.status
    }
}

// Owned keys and views must hash identically for `Borrow` lookups to work.
impl<S: Hash> Hash for AggregateKey<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.as_str().hash(state);
        self.status.hash(state);
    }
}

impl<S: Hash> Hash for dyn KeyView<S> + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        self.status().hash(state);
    }
}

impl<S: PartialEq> PartialEq for dyn KeyView<S> + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.status() == other.status()
    }
}

impl<S: Eq> Eq for dyn KeyView<S> + '_ {}

impl<'a, S: Copy + 'a> Borrow<dyn KeyView<S> + 'a> for AggregateKey<S> {
    fn borrow(&self) -> &(dyn KeyView<S> + 'a) {
        self
    }
}
