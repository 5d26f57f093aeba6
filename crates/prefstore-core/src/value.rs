//! Preference values
//!
//! A stored preference is one of six shapes. `PrefValue` is the tagged
//! union backends persist; `FromPrefValue` converts a stored value back
//! into the type a caller asked for.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single stored preference value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrefValue {
    String(String),
    Int(i32),
    Long(i64),
    #[serde(with = "float_repr")]
    Float(f32),
    Boolean(bool),
    StringSet(BTreeSet<String>),
}

/// The shape of a preference value, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Int,
    Long,
    Float,
    Boolean,
    StringSet,
}

impl ValueKind {
    /// Stable tag used by backends that store the kind next to the payload
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::StringSet => "string_set",
        }
    }

    /// Parse a tag produced by `as_str`
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(ValueKind::String),
            "int" => Some(ValueKind::Int),
            "long" => Some(ValueKind::Long),
            "float" => Some(ValueKind::Float),
            "boolean" => Some(ValueKind::Boolean),
            "string_set" => Some(ValueKind::StringSet),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::StringSet => "string set",
            other => other.as_str(),
        };
        f.write_str(name)
    }
}

impl PrefValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PrefValue::String(_) => ValueKind::String,
            PrefValue::Int(_) => ValueKind::Int,
            PrefValue::Long(_) => ValueKind::Long,
            PrefValue::Float(_) => ValueKind::Float,
            PrefValue::Boolean(_) => ValueKind::Boolean,
            PrefValue::StringSet(_) => ValueKind::StringSet,
        }
    }

    /// Map a dynamic JSON value onto a preference shape
    ///
    /// Integers become `Int` when they fit in 32 bits and `Long` otherwise,
    /// other numbers become `Float`, and arrays must hold only strings.
    /// `null` maps to `None` (a removal when staged). Objects and mixed
    /// arrays have no preference shape and are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Option<Self>, String> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(PrefValue::Boolean(b))),
            Value::String(s) => Ok(Some(PrefValue::String(s))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Some(match i32::try_from(i) {
                        Ok(small) => PrefValue::Int(small),
                        Err(_) => PrefValue::Long(i),
                    }))
                } else if let Some(f) = n.as_f64() {
                    Ok(Some(PrefValue::Float(f as f32)))
                } else {
                    Err(format!("number {} is out of range", n))
                }
            }
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    match item {
                        Value::String(s) => {
                            set.insert(s);
                        }
                        other => return Err(format!("string set contains non-string {}", other)),
                    }
                }
                Ok(Some(PrefValue::StringSet(set)))
            }
            Value::Object(_) => Err("objects are not a preference shape".to_string()),
        }
    }

    /// Render the value as plain JSON (no type tag)
    ///
    /// Non-finite floats render as the strings "NaN", "inf" and "-inf".
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PrefValue::String(s) => serde_json::Value::from(s.as_str()),
            PrefValue::Int(i) => serde_json::Value::from(*i),
            PrefValue::Long(l) => serde_json::Value::from(*l),
            PrefValue::Float(f) if !f.is_finite() => serde_json::Value::from(f.to_string()),
            PrefValue::Float(f) => serde_json::Value::from(*f),
            PrefValue::Boolean(b) => serde_json::Value::from(*b),
            PrefValue::StringSet(set) => {
                serde_json::Value::from(set.iter().cloned().collect::<Vec<_>>())
            }
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::String(s) => write!(f, "{}", s),
            PrefValue::Int(i) => write!(f, "{}", i),
            PrefValue::Long(l) => write!(f, "{}", l),
            PrefValue::Float(v) => write!(f, "{}", v),
            PrefValue::Boolean(b) => write!(f, "{}", b),
            PrefValue::StringSet(set) => {
                let items: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", items.join(","))
            }
        }
    }
}

impl From<String> for PrefValue {
    fn from(value: String) -> Self {
        PrefValue::String(value)
    }
}

impl From<&str> for PrefValue {
    fn from(value: &str) -> Self {
        PrefValue::String(value.to_string())
    }
}

impl From<i32> for PrefValue {
    fn from(value: i32) -> Self {
        PrefValue::Int(value)
    }
}

impl From<i64> for PrefValue {
    fn from(value: i64) -> Self {
        PrefValue::Long(value)
    }
}

impl From<f32> for PrefValue {
    fn from(value: f32) -> Self {
        PrefValue::Float(value)
    }
}

impl From<bool> for PrefValue {
    fn from(value: bool) -> Self {
        PrefValue::Boolean(value)
    }
}

impl From<BTreeSet<String>> for PrefValue {
    fn from(value: BTreeSet<String>) -> Self {
        PrefValue::StringSet(value)
    }
}

/// Serde representation of `PrefValue::Float`
///
/// JSON has no NaN or infinity. Non-finite floats are written as the
/// strings "NaN", "inf" and "-inf"; finite ones stay plain numbers.
mod float_repr {
    use std::fmt;

    use serde::de::{self, Unexpected, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f32(*value)
        } else {
            serializer.collect_str(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"inf\" or \"-inf\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f32, E> {
            Ok(v as f32)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f32, E> {
            match v.parse::<f32>() {
                Ok(f) if !f.is_finite() => Ok(f),
                _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }
    }
}

/// Conversion from a stored value into a requested type
///
/// Returns the stored value back on mismatch so the caller can report
/// what was actually there.
pub trait FromPrefValue: Sized {
    const KIND: ValueKind;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue>;
}

impl FromPrefValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::String(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl FromPrefValue for i32 {
    const KIND: ValueKind = ValueKind::Int;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::Int(i) => Ok(i),
            PrefValue::Long(l) => i32::try_from(l).map_err(|_| PrefValue::Long(l)),
            other => Err(other),
        }
    }
}

impl FromPrefValue for i64 {
    const KIND: ValueKind = ValueKind::Long;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::Long(l) => Ok(l),
            PrefValue::Int(i) => Ok(i64::from(i)),
            other => Err(other),
        }
    }
}

impl FromPrefValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::Float(f) => Ok(f),
            other => Err(other),
        }
    }
}

impl FromPrefValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::Boolean(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl FromPrefValue for BTreeSet<String> {
    const KIND: ValueKind = ValueKind::StringSet;

    fn from_pref_value(value: PrefValue) -> Result<Self, PrefValue> {
        match value {
            PrefValue::StringSet(set) => Ok(set),
            other => Err(other),
        }
    }
}
