//! Cookie sets and their wire representations.
//!
//! A [`CookieSet`] is the structured name → value mapping that the proxy caches
//! per upstream target. The [`codec`] functions convert between a set and the
//! `Cookie` / `Set-Cookie` header strings seen on the wire.

mod codec;

pub use codec::{
    CodecError, decode, decode_credential, decode_set_cookie, encode, encode_pair,
    serialize_set_cookie,
};

use std::fmt;

/// Mapping of cookie name to cookie value.
///
/// Names are unique. Inserting an existing name replaces its value in place, so
/// re-serialization keeps first-seen ordering and stays deterministic. Equality
/// ignores ordering.
///
/// Values are sensitive and are redacted from the `Debug` output.
#[derive(Clone, Default)]
pub struct CookieSet {
    entries: Vec<(String, String)>,
}

impl CookieSet {
    /// Creates an empty cookie set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a cookie, replacing the value of an existing cookie with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Returns the value for `name`, if present.
    ///
    /// Cookie values are sensitive; do not log the return value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` when a cookie named `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Number of cookies in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the set holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Iterates over cookie names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }
}

impl PartialEq for CookieSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl Eq for CookieSet {}

impl Extend<(String, String)> for CookieSet {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for CookieSet {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut set = CookieSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

// Custom Debug impl that redacts cookie values.
impl fmt::Debug for CookieSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.names().map(|name| (name, "[REDACTED]")))
            .finish()
    }
}
