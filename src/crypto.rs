//! Hashing primitives for proofchain
//!
//! Every node must derive the same digest for logically equal blocks, so
//! blocks are hashed over a canonical JSON rendering: object keys sorted by
//! name at every nesting level, no insignificant whitespace.

use crate::blockchain::Block;
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Canonical digest of a block.
pub fn hash_block(block: &Block) -> Result<String> {
    Ok(sha256_hex(canonical_json(block)?))
}

/// Render any serializable value as canonical JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

// Keys are sorted here, not by serde_json's map type, whose iteration order
// depends on the `preserve_order` feature.
fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;

    fn sample_block() -> Block {
        Block {
            index: 2,
            timestamp: 1_700_000_000.25,
            transactions: vec![Transaction::new("alice", "bob", 5.0)],
            proof: 35293,
            previous_hash: "abc".to_string(),
        }
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let json = canonical_json(&sample_block()).unwrap();
        assert_eq!(
            json,
            r#"{"index":2,"previous_hash":"abc","proof":35293,"timestamp":1700000000.25,"transactions":[{"amount":5.0,"recipient":"bob","sender":"alice"}]}"#
        );
    }

    #[test]
    fn test_hash_ignores_field_order() {
        let block = sample_block();
        let reordered: Block = serde_json::from_str(
            r#"{"transactions":[{"recipient":"bob","amount":5.0,"sender":"alice"}],
                "proof":35293,"previous_hash":"abc","index":2,"timestamp":1700000000.25}"#,
        )
        .unwrap();
        assert_eq!(hash_block(&block).unwrap(), hash_block(&reordered).unwrap());
    }

    #[test]
    fn test_hash_is_lowercase_hex() {
        let digest = hash_block(&sample_block()).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let block = sample_block();
        let mut other = block.clone();
        other.transactions[0].amount = 6.0;
        assert_ne!(hash_block(&block).unwrap(), hash_block(&other).unwrap());
    }
}
