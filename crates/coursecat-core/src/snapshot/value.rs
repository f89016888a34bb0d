//! Content tree for catalog snapshots.

use crate::error::Error;
use std::collections::BTreeMap;

/// A node in a catalog snapshot.
///
/// Records and lists compare structurally. Record keys are kept sorted.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ContentValue {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Text(String),
    /// Ordered list.
    List(Vec<ContentValue>),
    /// Named fields.
    Record(BTreeMap<String, ContentValue>),
}

impl ContentValue {
    /// An empty record.
    pub fn empty_record() -> Self {
        ContentValue::Record(BTreeMap::new())
    }

    /// Build a content tree from JSON.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, Error> {
        Ok(match json {
            serde_json::Value::Null => ContentValue::Null,
            serde_json::Value::Bool(b) => ContentValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ContentValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    ContentValue::Float(f)
                } else {
                    return Err(Error::InvalidSnapshot(format!("unsupported number {n}")));
                }
            }
            serde_json::Value::String(s) => ContentValue::Text(s.clone()),
            serde_json::Value::Array(items) => ContentValue::List(
                items
                    .iter()
                    .map(ContentValue::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => ContentValue::Record(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), ContentValue::from_json(v)?)))
                    .collect::<Result<_, Error>>()?,
            ),
        })
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ContentValue::Null => serde_json::Value::Null,
            ContentValue::Bool(b) => serde_json::Value::Bool(*b),
            ContentValue::Int(i) => serde_json::Value::from(*i),
            ContentValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ContentValue::Text(s) => serde_json::Value::String(s.clone()),
            ContentValue::List(items) => {
                serde_json::Value::Array(items.iter().map(ContentValue::to_json).collect())
            }
            ContentValue::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(&self.to_json()).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))?;
        Self::from_json(&json)
    }

    /// Look up a field of a record.
    pub fn get(&self, field: &str) -> Option<&ContentValue> {
        match self {
            ContentValue::Record(fields) => fields.get(field),
            _ => None,
        }
    }

    /// Check if this is a record.
    pub fn is_record(&self) -> bool {
        matches!(self, ContentValue::Record(_))
    }

    /// Number of leaf fields under this node.
    ///
    /// Scalars and empty containers count as one.
    pub fn leaf_count(&self) -> usize {
        match self {
            ContentValue::List(items) if !items.is_empty() => {
                items.iter().map(ContentValue::leaf_count).sum()
            }
            ContentValue::Record(fields) if !fields.is_empty() => {
                fields.values().map(ContentValue::leaf_count).sum()
            }
            _ => 1,
        }
    }

    /// Scalar rendered as a matching key, if it can act as one.
    pub fn key_string(&self) -> Option<String> {
        match self {
            ContentValue::Int(i) => Some(i.to_string()),
            ContentValue::Text(s) => Some(s.clone()),
            ContentValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Compact JSON rendering.
    pub fn render(&self) -> String {
        self.to_json().to_string()
    }
}

impl From<serde_json::Value> for ContentValue {
    fn from(json: serde_json::Value) -> Self {
        // Only non-representable numbers fail, and those cannot come out of serde_json.
        ContentValue::from_json(&json).unwrap_or(ContentValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_roundtrip() {
        let json = json!({
            "term": "Fall",
            "year": 2025,
            "gpa_floor": 2.5,
            "open": true,
            "notes": null,
            "courses": [{"code": "CS101", "credits": 3}]
        });

        let value = ContentValue::from_json(&json).unwrap();
        assert_eq!(value.to_json(), json);

        let bytes = value.to_bytes().unwrap();
        assert_eq!(ContentValue::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn test_leaf_count() {
        let value = ContentValue::from(json!({
            "a": 1,
            "b": {"c": 2, "d": [3, 4]},
            "e": [],
            "f": {}
        }));
        assert_eq!(value.leaf_count(), 6);
        assert_eq!(ContentValue::Null.leaf_count(), 1);
    }

    #[test]
    fn test_key_string() {
        assert_eq!(ContentValue::Text("CS101".into()).key_string().as_deref(), Some("CS101"));
        assert_eq!(ContentValue::Int(7).key_string().as_deref(), Some("7"));
        assert_eq!(ContentValue::Float(1.5).key_string(), None);
        assert_eq!(ContentValue::empty_record().key_string(), None);
    }

    #[test]
    fn test_invalid_bytes() {
        let err = ContentValue::from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization(_)));
    }
}
