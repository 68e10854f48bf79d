//! JSON conversions for SQLite values.
//!
//! Note: BLOB cells surface as base64-encoded strings since JSON has no
//! native binary type, and a real that JSON cannot represent (NaN,
//! infinities) surfaces as JSON null.

use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::types::{FromSql, ToSql};
use crate::value::Value;

impl ToSql for JsonValue {
   fn to_sql(&self) -> Result<Value> {
      Ok(match self {
         JsonValue::Null => Value::Null,
         JsonValue::Bool(b) => Value::Integer(*b as i64),
         JsonValue::Number(n) => {
            // Preserve integer precision by binding as i64 when possible.
            if let Some(i) = n.as_i64() {
               Value::Integer(i)
            } else if let Some(u) = n.as_u64() {
               if u <= i64::MAX as u64 {
                  Value::Integer(u as i64)
               } else {
                  // Value too large for SQLite's INTEGER, falls back to REAL.
                  Value::Real(u as f64)
               }
            } else {
               Value::Real(n.as_f64().unwrap_or_default())
            }
         }
         JsonValue::String(s) => Value::Text(s.clone()),
         // Arrays and objects are stored as their JSON text.
         other => Value::Text(other.to_string()),
      })
   }
}

impl FromSql for JsonValue {
   fn from_sql(value: &Value) -> Result<Self> {
      Ok(match value {
         Value::Null => JsonValue::Null,
         Value::Integer(i) => JsonValue::Number((*i).into()),
         Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
         Value::Text(s) => JsonValue::String(s.clone()),
         Value::Blob(b) => JsonValue::String(base64_encode(b)),
      })
   }
}

/// Base64 encode binary data for JSON serialization.
fn base64_encode(data: &[u8]) -> String {
   use base64::Engine;
   base64::engine::general_purpose::STANDARD.encode(data)
}
