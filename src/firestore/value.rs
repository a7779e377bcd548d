//! Conversion between [`FieldValue`] and the Firestore REST `Value` encoding,
//! where every value is an object with a single kind key such as
//! `{"integerValue": "0"}`.

use serde_json::{Map, Value, json};

const OPAQUE_KINDS: &[&str] = &[
    "timestampValue",
    "bytesValue",
    "referenceValue",
    "geoPointValue",
    "arrayValue",
    "mapValue",
];

/// A profile field value. Kinds the backfill never writes are carried as
/// their raw encoded form.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Other(Value),
}

impl FieldValue {
    pub fn to_firestore(&self) -> Value {
        match self {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::Boolean(b) => json!({ "booleanValue": b }),
            FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
            FieldValue::Double(d) if d.is_nan() => json!({ "doubleValue": "NaN" }),
            FieldValue::Double(d) if d.is_infinite() => {
                let repr = if *d > 0.0 { "Infinity" } else { "-Infinity" };
                json!({ "doubleValue": repr })
            }
            FieldValue::Double(d) => json!({ "doubleValue": d }),
            FieldValue::String(s) => json!({ "stringValue": s }),
            FieldValue::Other(raw) => raw.clone(),
        }
    }

    pub fn from_firestore(encoded: &Value) -> Result<Self, String> {
        let object = encoded
            .as_object()
            .ok_or_else(|| format!("expected a value object, got {encoded}"))?;

        if object.contains_key("nullValue") {
            return Ok(FieldValue::Null);
        }
        if let Some(b) = object.get("booleanValue") {
            return b
                .as_bool()
                .map(FieldValue::Boolean)
                .ok_or_else(|| format!("booleanValue is not a bool: {b}"));
        }
        if let Some(i) = object.get("integerValue") {
            return parse_integer(i).map(FieldValue::Integer);
        }
        if let Some(d) = object.get("doubleValue") {
            return parse_double(d).map(FieldValue::Double);
        }
        if let Some(s) = object.get("stringValue") {
            return s
                .as_str()
                .map(|s| FieldValue::String(s.to_string()))
                .ok_or_else(|| format!("stringValue is not a string: {s}"));
        }
        if OPAQUE_KINDS.iter().any(|kind| object.contains_key(*kind)) {
            return Ok(FieldValue::Other(encoded.clone()));
        }
        Err(format!("unrecognised value kind: {encoded}"))
    }
}

// Integers travel as decimal strings, though numbers are accepted as well.
fn parse_integer(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::String(s) => s
            .parse()
            .map_err(|e| format!("integerValue {s:?} is not an int64: {e}")),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("integerValue {n} is not an int64")),
        other => Err(format!("integerValue has unexpected type: {other}")),
    }
}

// "NaN", "Infinity" and "-Infinity" are sent as strings.
fn parse_double(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("doubleValue {n} is not a double")),
        Value::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => Err(format!("doubleValue has unexpected string {s:?}")),
        },
        other => Err(format!("doubleValue has unexpected type: {other}")),
    }
}

pub fn encode_fields<'a, I>(fields: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (&'a String, &'a FieldValue)>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name.clone(), value.to_firestore()))
        .collect()
}
