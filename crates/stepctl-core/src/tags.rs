//! Resource tags and the ownership convention.
//!
//! A resource carrying `ManagedBy=stepctl` is owned by this tool and may be
//! updated or deleted by it. Resources without the tag are never written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag key that marks ownership.
pub const MANAGED_BY_KEY: &str = "ManagedBy";

/// Tag value written by this tool.
pub const TOOL_NAME: &str = "stepctl";

/// A single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered tag set with unique keys.
///
/// Order is preserved so that rendered diffs stay stable for a fixed input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Create an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Look up a tag value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Set a tag, replacing the value in place if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|t| t.key == key) {
            Some(existing) => existing.value = value,
            None => self.0.push(Tag { key, value }),
        }
    }

    /// Merge another tag set into this one.
    ///
    /// Existing keys take the incoming value; new keys are appended in the
    /// order they appear in `other`.
    pub fn merge(&mut self, other: &Self) {
        for tag in &other.0 {
            self.insert(tag.key.clone(), tag.value.clone());
        }
    }

    /// Return a copy with the ownership tag set.
    #[must_use]
    pub fn with_ownership(mut self) -> Self {
        self.insert(MANAGED_BY_KEY, TOOL_NAME);
        self
    }

    /// Whether the ownership tag is present with this tool's name.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.get(MANAGED_BY_KEY) == Some(TOOL_NAME)
    }

    /// Iterate over tags in order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Number of tags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Tags> for BTreeMap<String, String> {
    fn from(tags: Tags) -> Self {
        tags.0.into_iter().map(|t| (t.key, t.value)).collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = Self::new();
        for (k, v) in iter {
            tags.insert(k, v);
        }
        tags
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
