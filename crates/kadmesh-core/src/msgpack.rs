// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// Thin wrappers around the `rmp` crate family giving the rest of the crate
// a single MessagePack import point: `to_vec`/`from_slice` for typed data,
// `read_value`/`write_value` for the dynamic values the codec walks.

use serde::{de::DeserializeOwned, Serialize};

/// Convenience re-export of the dynamic MessagePack value type.
pub use rmpv::Value;

/// Serialize `value` into a MessagePack byte vector (struct fields by name).
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, rmp_serde::encode::Error> {
    rmp_serde::to_vec_named(value)
}

/// Deserialize `T` from a MessagePack byte slice.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

/// Convert a decoded dynamic value into typed data.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, rmpv::ext::Error> {
    rmpv::ext::from_value(value)
}

/// Decode one dynamic value from the front of `bytes`.
pub fn read_value(mut bytes: &[u8]) -> Result<Value, rmpv::decode::Error> {
    rmpv::decode::read_value(&mut bytes)
}

/// Encode one dynamic value into a byte vector.
pub fn write_value(value: &Value) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    Ok(buf)
}

/// Look up `key` in a map value. Non-map values and non-string keys yield
/// `None`.
pub fn find_map_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Map(entries) => entries.iter().find_map(|(k, v)| match k {
            Value::String(s) if s.as_str() == Some(key) => Some(v),
            _ => None,
        }),
        _ => None,
    }
}

/// Extract a byte blob from a bin or str atom.
pub fn as_blob(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Binary(bytes) => Some(bytes.clone()),
        Value::String(s) => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_roundtrip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Probe {
            seq: u32,
            tag: String,
        }

        let probe = Probe { seq: 9, tag: "x".into() };
        let bytes = to_vec(&probe).expect("encode");
        let back: Probe = from_slice(&bytes).expect("decode");
        assert_eq!(back, probe);
    }

    #[test]
    fn find_map_value_skips_non_string_keys() {
        let map = Value::Map(vec![
            (Value::from(7), Value::from("seven")),
            (Value::from("k"), Value::from(1)),
        ]);
        assert_eq!(find_map_value(&map, "k"), Some(&Value::from(1)));
        assert_eq!(find_map_value(&map, "missing"), None);
        assert_eq!(find_map_value(&Value::from(3), "k"), None);
    }

    #[test]
    fn blobs_from_bin_and_str() {
        assert_eq!(as_blob(&Value::Binary(vec![1, 2])), Some(vec![1, 2]));
        assert_eq!(as_blob(&Value::from("ab")), Some(b"ab".to_vec()));
        assert_eq!(as_blob(&Value::from(1)), None);
    }

    #[test]
    fn dynamic_value_roundtrip() {
        let value = Value::Map(vec![(Value::from("n"), Value::from(42))]);
        let bytes = write_value(&value).expect("encode");
        assert_eq!(read_value(&bytes).expect("decode"), value);
    }
}
