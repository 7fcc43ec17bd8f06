//! The fingerprint by which multiple cached representations of one URL
//! coexist: either the sentinel `None` (no `Vary`) or a lowercased mapping
//! from request-header name to the request-header value that was present
//! when the response was stored.

use std::collections::BTreeMap;

use serde::{
    de::Error as DeError, ser::SerializeSeq, Deserialize, Deserializer,
    Serialize, Serializer,
};

use crate::headers::HeaderMap;

/// A cache subtype: the `Vary` fingerprint distinguishing representations
/// of a single URL from one another.
///
/// Equality (and, by construction, the canonical JSON form) is
/// order-independent: two subtypes built from the same `(name, value)`
/// pairs in any order compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Subtype {
    /// No `Vary` was present; there is at most one such record per URL.
    #[default]
    None,
    /// Lowercased `(header name, header value)` pairs, sorted by name.
    Vary(BTreeMap<String, String>),
}

impl Subtype {
    /// Builds a `Vary` subtype from an iterator of `(name, value)` pairs,
    /// lowercasing both.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let map: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| {
                (k.as_ref().to_ascii_lowercase(), v.as_ref().to_string())
            })
            .collect();
        if map.is_empty() {
            Subtype::None
        } else {
            Subtype::Vary(map)
        }
    }

    /// Returns true iff every `(name, value)` pair in this subtype matches
    /// the corresponding header in `headers` (case-insensitive lookup, an
    /// exact string comparison of the value).
    ///
    /// `Subtype::None` never matches here; callers special-case it as the
    /// fallback representation (see [`crate::handlers::cacheable_request`]).
    pub fn matches_request_headers(&self, headers: &HeaderMap) -> bool {
        match self {
            Subtype::None => false,
            Subtype::Vary(pairs) => pairs
                .iter()
                .all(|(k, v)| headers.get(k) == Some(v.as_str())),
        }
    }

    /// The canonical JSON encoding used both for equality/hashing of the
    /// in-memory value and for the `<subtype-json>` line of a filesystem
    /// store's index file: `null`, or `[[k1,v1],[k2,v2],...]` sorted by key.
    pub fn canonical_json(&self) -> serde_json::Value {
        match self {
            Subtype::None => serde_json::Value::Null,
            Subtype::Vary(pairs) => serde_json::Value::Array(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        serde_json::Value::Array(vec![
                            serde_json::Value::String(k.clone()),
                            serde_json::Value::String(v.clone()),
                        ])
                    })
                    .collect(),
            ),
        }
    }

    /// The canonical JSON encoding as a compact string — used directly as
    /// the md5 preimage for a record's content-file suffix.
    pub fn canonical_string(&self) -> String {
        // `serde_json::to_string` on a `Value` never fails.
        serde_json::to_string(&self.canonical_json()).unwrap()
    }
}

impl Serialize for Subtype {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match self {
            Subtype::None => serializer.serialize_none(),
            Subtype::Vary(pairs) => {
                let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                for (k, v) in pairs {
                    seq.serialize_element(&(k, v))?;
                }
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Subtype {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Null => Ok(Subtype::None),
            serde_json::Value::Array(items) => {
                let mut map = BTreeMap::new();
                for item in items {
                    let pair = item.as_array().ok_or_else(|| {
                        DeError::custom("subtype pair is not an array")
                    })?;
                    if pair.len() != 2 {
                        return Err(DeError::custom(
                            "subtype pair must have exactly 2 elements",
                        ));
                    }
                    let k = pair[0]
                        .as_str()
                        .ok_or_else(|| {
                            DeError::custom("subtype key is not a string")
                        })?
                        .to_string();
                    let v = pair[1]
                        .as_str()
                        .ok_or_else(|| {
                            DeError::custom("subtype value is not a string")
                        })?
                        .to_string();
                    map.insert(k, v);
                }
                if map.is_empty() {
                    Ok(Subtype::None)
                } else {
                    Ok(Subtype::Vary(map))
                }
            }
            _ => Err(DeError::custom("subtype must be null or an array")),
        }
    }
}
