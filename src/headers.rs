//! A case-insensitive header multimap-of-one (single value per name), used
//! throughout the cache core for request headers, response headers, and the
//! synthetic headers stored alongside a [`crate::record::Record`].

use std::collections::HashMap;

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Case-insensitive mapping from header name to value.
///
/// Lookups and membership tests are case-insensitive; iteration yields
/// names in the case they were first inserted with, in insertion order.
///
/// Serializes as a flat JSON object of `name: value`, matching the
/// filesystem store's on-disk header-line format, rather than its internal
/// order/entries representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    /// Insertion order, storing the display-case name.
    order: Vec<String>,
    /// Lowercased name -> (display-case name, value).
    entries: HashMap<String, (String, String)>,
}

impl HeaderMap {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites `name`'s value. The display case of the first
    /// insertion of a given name is preserved across updates.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        let name = name.into();
        let key = name.to_ascii_lowercase();
        let value = value.into();
        if let Some(existing) = self.entries.get_mut(&key) {
            existing.1 = value;
        } else {
            self.order.push(key.clone());
            self.entries.insert(key, (name, value));
        }
    }

    /// Removes `name`, returning its value if present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        let removed = self.entries.remove(&key);
        if removed.is_some() {
            self.order.retain(|k| k != &key);
        }
        removed.map(|(_, v)| v)
    }

    /// Looks up `name`'s value, case-insensitively. Absent headers return
    /// `None`, matching HTTP convention rather than treating a missing
    /// header as an error.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(|(_, v)| v.as_str())
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates `(display-case name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().map(move |key| {
            let (name, value) = &self.entries[key];
            (name.as_str(), value.as_str())
        })
    }

    /// Number of headers stored.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no headers are stored.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Serialize for HeaderMap {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct HeaderMapVisitor;

impl<'de> Visitor<'de> for HeaderMapVisitor {
    type Value = HeaderMap;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("a JSON object of header name to value")
    }

    fn visit_map<A: MapAccess<'de>>(
        self,
        mut access: A,
    ) -> Result<Self::Value, A::Error> {
        let mut map = HeaderMap::new();
        while let Some((name, value)) = access.next_entry::<String, String>()? {
            map.insert(name, value);
        }
        Ok(map)
    }
}

impl<'de> Deserialize<'de> for HeaderMap {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        deserializer.deserialize_map(HeaderMapVisitor)
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = HeaderMap::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn missing_header_is_none_not_error() {
        let h = HeaderMap::new();
        assert_eq!(h.get("etag"), None);
    }

    #[test]
    fn preserves_first_seen_case_on_overwrite() {
        let mut h = HeaderMap::new();
        h.insert("ETag", "\"v1\"");
        h.insert("etag", "\"v2\"");
        assert_eq!(h.iter().collect::<Vec<_>>(), vec![("ETag", "\"v2\"")]);
    }

    #[test]
    fn iteration_order_matches_insertion() {
        let mut h = HeaderMap::new();
        h.insert("b", "2");
        h.insert("a", "1");
        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn remove_drops_from_iteration() {
        let mut h = HeaderMap::new();
        h.insert("a", "1");
        h.remove("A");
        assert!(h.is_empty());
    }

    #[test]
    fn serializes_as_flat_object() {
        let mut h = HeaderMap::new();
        h.insert("ETag", "\"v1\"");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"ETag":"\"v1\""}"#);
    }

    #[test]
    fn round_trips_through_json() {
        let mut h = HeaderMap::new();
        h.insert("Date", "Sun, 06 Nov 1994 08:49:37 GMT");
        h.insert("ETag", "\"v1\"");
        let json = serde_json::to_string(&h).unwrap();
        let back: HeaderMap = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
