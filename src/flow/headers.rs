// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Ordered header multimap with case-insensitive lookup

use serde::{Deserialize, Serialize};

/// HTTP header collection.
///
/// Preserves insertion order and duplicate names on emission; lookup is
/// case-insensitive per RFC 9110.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values with the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Get the first value for a name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a name, in insertion order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Check whether a name is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace all values for a name with a single value.
    ///
    /// The replacement takes the position of the first occurrence; if the
    /// name was absent it is appended.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        let first = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name));
        match first {
            Some(idx) => {
                self.entries
                    .retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
                self.entries.insert(idx.min(self.entries.len()), (name, value));
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Remove all values for a name
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of header entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether any header *name* contains the given lowercase needle
    pub fn any_name_contains(&self, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, _)| n.to_lowercase().contains(needle))
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a (String, String);
    type IntoIter = std::slice::Iter<'a, (String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut headers = Headers::new();
        headers.append("Content-Type", "text/html");
        assert_eq!(headers.get("content-type"), Some("text/html"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/html"));
        assert!(headers.contains("Content-type"));
    }

    #[test]
    fn test_order_preserved() {
        let mut headers = Headers::new();
        headers.append("Host", "example.com");
        headers.append("Set-Cookie", "a=1");
        headers.append("Set-Cookie", "b=2");

        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Host", "Set-Cookie", "Set-Cookie"]);
        assert_eq!(headers.get_all("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_set_replaces_all() {
        let mut headers = Headers::new();
        headers.append("Cookie", "old=1");
        headers.append("Accept", "*/*");
        headers.append("cookie", "old=2");

        headers.set("Cookie", "session=abc");
        assert_eq!(headers.get_all("cookie"), vec!["session=abc"]);
        // Replacement holds the original first position
        assert_eq!(headers.iter().next().unwrap().0, "Cookie");
    }
}
