//! Change-detection checksums over canonical JSON.
//!
//! The checksum is the sum of the UTF-16 code units of the canonical JSON
//! text. It is a cheap diff signal, not an integrity primitive: reordering
//! characters produces the same value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Sums the UTF-16 code units of `text`.
pub fn utf16_checksum(text: &str) -> u64 {
    text.encode_utf16().map(u64::from).sum()
}

/// Checksum of the canonical JSON form of `value` (object keys sorted,
/// no insignificant whitespace).
pub fn canonical_checksum(value: &Value) -> u64 {
    let mut out = String::new();
    write_canonical(value, &mut out);
    utf16_checksum(&out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Per-collection checksums for one `gameID:branch` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
    pub key: String,
    pub checksums: BTreeMap<String, u64>,
}

impl ChecksumRecord {
    pub fn new(game_id: &crate::GameId, branch: &crate::BranchName) -> Self {
        Self {
            key: Self::key_for(game_id, branch),
            checksums: BTreeMap::new(),
        }
    }

    /// Builds the store key `gameID:branch`.
    pub fn key_for(game_id: &crate::GameId, branch: &crate::BranchName) -> String {
        format!("{}:{}", game_id, branch)
    }

    /// Splits a store key back into its game and branch parts.
    pub fn split_key(key: &str) -> crate::Result<(crate::GameId, crate::BranchName)> {
        let (game, branch) = key
            .split_once(':')
            .ok_or_else(|| crate::Error::InvalidChecksumKey(key.to_string()))?;
        if game.is_empty() {
            return Err(crate::Error::InvalidChecksumKey(key.to_string()));
        }
        Ok((crate::GameId::new(game), crate::BranchName::parse(branch)?))
    }

    pub fn with_checksum(mut self, collection: impl Into<String>, checksum: u64) -> Self {
        self.checksums.insert(collection.into(), checksum);
        self
    }

    /// Collections whose checksum differs from `previous`, including
    /// collections present on only one side. Sorted by name.
    pub fn changed_collections(&self, previous: &ChecksumRecord) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .checksums
            .keys()
            .chain(previous.checksums.keys())
            .collect();
        names
            .into_iter()
            .filter(|name| self.checksums.get(*name) != previous.checksums.get(*name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ascii_sum() {
        assert_eq!(utf16_checksum("ab"), 97 + 98);
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = json!({"b": 1, "a": [1, 2]});
        let b = json!({"a": [1, 2], "b": 1});
        assert_eq!(canonical_checksum(&a), canonical_checksum(&b));
    }

    #[test]
    fn surrogate_pairs_count_both_units() {
        // U+1F600 encodes as D83D DE00
        assert_eq!(utf16_checksum("\u{1F600}"), 0xD83D + 0xDE00);
    }
}
