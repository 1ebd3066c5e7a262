//! Datadog-style tags.

use std::fmt;

use serde::Serialize;

/// A metric tag.
///
/// Tags are either bare (`production`) or key/value pairs separated by the first colon (`env:production`).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Creates a key/value tag.
    pub fn from_key_value(key: &str, value: &str) -> Self {
        Self(format!("{}:{}", key, value))
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Gets the name of the tag.
    ///
    /// For bare tags (e.g. `production`), this is the entire tag. For key/value-style tags (e.g. `service:web`), this
    /// is the key part of the tag, or `service` based on the example.
    pub fn name(&self) -> &str {
        match self.0.split_once(':') {
            Some((name, _)) => name,
            None => &self.0,
        }
    }

    /// Gets the value of the tag.
    ///
    /// For bare tags, this always returns `None`.
    pub fn value(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, value)| value)
    }

    /// Consumes the tag and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl PartialEq<str> for Tag {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Tag {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of tags.
///
/// Insertion order is preserved and duplicate tags are ignored. Equality does not depend on order.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    /// Creates a new, empty tag set with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Returns `true` if the tag set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of tags in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Inserts a tag into the set.
    ///
    /// Returns `false` if the tag was already present, in which case the set is unchanged.
    pub fn insert_tag<T>(&mut self, tag: T) -> bool
    where
        T: Into<Tag>,
    {
        let tag = tag.into();
        if self.0.iter().any(|existing| existing == &tag) {
            return false;
        }
        self.0.push(tag);
        true
    }

    /// Returns `true` if the given tag is contained in the set.
    ///
    /// This matches the complete tag, rather than just the name.
    pub fn has_tag<T>(&self, tag: T) -> bool
    where
        T: AsRef<str>,
    {
        let tag = tag.as_ref();
        self.0.iter().any(|existing| existing.as_str() == tag)
    }

    /// Gets a single tag, by name, from the set.
    ///
    /// If multiple tags share the name, the first one inserted is returned.
    pub fn get_single_tag<T>(&self, tag_name: T) -> Option<&Tag>
    where
        T: AsRef<str>,
    {
        let tag_name = tag_name.as_ref();
        self.0.iter().find(|tag| tag.name() == tag_name)
    }

    /// Merges the tags from another set into this set, skipping those already present.
    pub fn merge_missing(&mut self, other: &TagSet) {
        for tag in &other.0 {
            if !self.0.contains(tag) {
                self.0.push(tag.clone());
            }
        }
    }

    /// Returns an iterator over the tags in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    /// Returns the tags as a sorted list of strings.
    pub fn to_sorted_strings(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.0.iter().map(|tag| tag.as_str().to_string()).collect();
        tags.sort_unstable();
        tags
    }
}

impl PartialEq for TagSet {
    fn eq(&self, other: &TagSet) -> bool {
        self.0.len() == other.0.len() && other.0.iter().all(|tag| self.0.contains(tag))
    }
}

impl Eq for TagSet {}

impl IntoIterator for TagSet {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: Into<Tag>> FromIterator<T> for TagSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tags = TagSet::default();
        tags.extend(iter);
        tags
    }
}

impl<T: Into<Tag>> Extend<T> for TagSet {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for tag in iter {
            self.insert_tag(tag);
        }
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;

        for (i, tag) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }

            write!(f, "{}", tag.as_str())?;
        }

        write!(f, "]")
    }
}
