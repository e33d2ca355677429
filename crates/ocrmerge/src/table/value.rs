//! Typed representation of raw OCR extraction payloads.
//!
//! Payloads arrive as JSON text of arbitrary shape. They are parsed into
//! [`ExtractionValue`], a tagged variant that keeps object keys in document
//! order so that header order in the normalized table follows the payload.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::NormalizeError;

/// A parsed extraction payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<ExtractionValue>),
    /// Object entries in document order. Duplicate keys keep the last value
    /// at the position of the first occurrence.
    Object(Vec<(String, ExtractionValue)>),
}

impl ExtractionValue {
    /// Parses a raw payload. Blank input is treated as an empty result.
    pub fn parse(payload: &str) -> Result<Self, NormalizeError> {
        if payload.trim().is_empty() {
            return Ok(ExtractionValue::Null);
        }
        serde_json::from_str(payload).map_err(|e| NormalizeError::MalformedResult(e.to_string()))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, ExtractionValue::Array(_) | ExtractionValue::Object(_))
    }

    /// Returns true for `null`, `[]` and `{}`.
    pub fn is_empty(&self) -> bool {
        match self {
            ExtractionValue::Null => true,
            ExtractionValue::Array(items) => items.is_empty(),
            ExtractionValue::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    /// Stringifies a scalar for use as a table cell.
    ///
    /// Non-scalars are rendered as compact JSON.
    pub fn to_cell(&self) -> String {
        match self {
            ExtractionValue::Null => String::new(),
            ExtractionValue::Bool(b) => b.to_string(),
            ExtractionValue::Number(n) => n.to_string(),
            ExtractionValue::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl Serialize for ExtractionValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ExtractionValue::Null => serializer.serialize_unit(),
            ExtractionValue::Bool(b) => serializer.serialize_bool(*b),
            ExtractionValue::Number(n) => n.serialize(serializer),
            ExtractionValue::String(s) => serializer.serialize_str(s),
            ExtractionValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ExtractionValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ExtractionValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ExtractionValueVisitor)
    }
}

struct ExtractionValueVisitor;

impl<'de> Visitor<'de> for ExtractionValueVisitor {
    type Value = ExtractionValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(ExtractionValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(ExtractionValue::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(ExtractionValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(serde_json::Number::from_f64(v)
            .map(ExtractionValue::Number)
            .unwrap_or(ExtractionValue::Null))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(ExtractionValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(ExtractionValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(ExtractionValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(ExtractionValue::Null)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ExtractionValue::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut fields: Vec<(String, ExtractionValue)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, ExtractionValue>()? {
            match fields.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => existing.1 = value,
                None => fields.push((key, value)),
            }
        }
        Ok(ExtractionValue::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preserves_key_order() {
        let value = ExtractionValue::parse(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#).unwrap();
        match value {
            ExtractionValue::Object(fields) => {
                let keys: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
            }
            other => panic!("Expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_blank_is_null() {
        assert_eq!(ExtractionValue::parse("   \n").unwrap(), ExtractionValue::Null);
    }

    #[test]
    fn test_parse_malformed() {
        let err = ExtractionValue::parse("{not json").unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedResult(_)));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let value = ExtractionValue::parse(r#"{"a": 1, "b": 2, "a": 3}"#).unwrap();
        let ExtractionValue::Object(fields) = value else {
            panic!("expected an object");
        };
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0, "a");
        assert_eq!(fields[0].1.to_cell(), "3");
    }

    #[test]
    fn test_scalar_cells() {
        assert_eq!(ExtractionValue::Null.to_cell(), "");
        assert_eq!(ExtractionValue::Bool(true).to_cell(), "true");
        assert_eq!(ExtractionValue::parse("12.5").unwrap().to_cell(), "12.5");
        assert_eq!(ExtractionValue::parse("-7").unwrap().to_cell(), "-7");
        assert_eq!(
            ExtractionValue::String("hello".to_string()).to_cell(),
            "hello"
        );
    }

    #[test]
    fn test_serialize_keeps_order() {
        let value = ExtractionValue::parse(r#"{"b": [1, 2], "a": {"y": null, "x": true}}"#).unwrap();
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"b":[1,2],"a":{"y":null,"x":true}}"#);
    }

    #[test]
    fn test_is_empty() {
        assert!(ExtractionValue::parse("[]").unwrap().is_empty());
        assert!(ExtractionValue::parse("{}").unwrap().is_empty());
        assert!(ExtractionValue::Null.is_empty());
        assert!(!ExtractionValue::parse("0").unwrap().is_empty());
    }
}
