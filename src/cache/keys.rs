//! Cache key definitions.
//!
//! A key is the cached function's name followed by its JSON-serialized
//! arguments, e.g. `get_page_with_retry:["abc"]`. Keys stay human-readable so
//! the durable tier can be listed and inspected by prefix.

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;

/// Separator between the namespace and each key part.
pub const KEY_DELIMITER: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for `name` called with `args`.
    ///
    /// Structurally equal arguments serialize identically and so share a key.
    pub fn for_call<A>(name: &str, args: &A) -> Result<Self, serde_json::Error>
    where
        A: Serialize + ?Sized,
    {
        let serialized = serde_json::to_string(args)?;
        Ok(Self::from_parts(name, [serialized.as_str()]))
    }

    /// Joins a namespace and its parts with [`KEY_DELIMITER`].
    pub fn from_parts<'a, I>(namespace: &str, parts: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut key = namespace.to_string();
        for part in parts {
            key.push_str(KEY_DELIMITER);
            key.push_str(part);
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0
            .split_once(KEY_DELIMITER)
            .map_or(self.0.as_str(), |(namespace, _)| namespace)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}
