//! Resolved query output.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use swarmdb_protocol::{Atom, DbError};

/// Resolved query output. Objects keep the field order of the query.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Atom(Atom),
    Object(Vec<(String, Value)>),
    List(Vec<Value>),
}

impl Value {
    pub fn null() -> Self {
        Value::Atom(Atom::Null)
    }

    /// Look up a key of an object value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Value::Atom(atom) => Some(atom),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Atom(Atom::Null))
    }

    pub fn to_json(&self) -> Result<serde_json::Value, DbError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl From<Atom> for Value {
    fn from(atom: Atom) -> Self {
        Value::Atom(atom)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Atom(atom) => atom.serialize(serializer),
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_serializes_in_field_order() {
        let value = Value::Object(vec![
            ("zeta".into(), Value::from(Atom::Int(1))),
            ("alpha".into(), Value::List(vec![Value::from(Atom::from("a"))])),
        ]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":["a"]}"#);
    }

    #[test]
    fn test_to_json_converts_tree() {
        let value = Value::Object(vec![("n".into(), Value::null())]);
        assert_eq!(value.to_json().unwrap(), serde_json::json!({ "n": null }));
    }
}
