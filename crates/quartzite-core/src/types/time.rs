//! Datetime conversions backed by the `time` crate.
//!
//! Values are stored as ISO-8601 text, the representation SQLite's own
//! date functions expect: `YYYY-MM-DD HH:MM:SS` for naive datetimes,
//! RFC 3339 for offset datetimes, `YYYY-MM-DD` for dates.

use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::error::{Error, Result};
use crate::types::{FromSql, ToSql};
use crate::value::Value;

const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
   format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

fn parse_error<T>(expected: &str, value: &Value) -> Result<T> {
   Err(Error::TypeMismatch {
      expected: expected.to_string(),
      actual: match value {
         Value::Text(s) => format!("text {s:?}"),
         other => other.type_name().to_string(),
      },
   })
}

impl ToSql for PrimitiveDateTime {
   fn to_sql(&self) -> Result<Value> {
      match self.format(&DATETIME_FORMAT) {
         Ok(s) => Ok(Value::Text(s)),
         Err(e) => Err(Error::Bind {
            reason: format!("cannot format datetime: {e}"),
         }),
      }
   }
}

impl FromSql for PrimitiveDateTime {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Text(s) => PrimitiveDateTime::parse(s, &DATETIME_FORMAT)
            .or_else(|_| parse_error("datetime text (YYYY-MM-DD HH:MM:SS)", value)),
         Value::Null => Err(Error::UnexpectedNull {
            column: String::new(),
         }),
         other => parse_error("datetime text", other),
      }
   }
}

impl ToSql for OffsetDateTime {
   fn to_sql(&self) -> Result<Value> {
      match self.format(&Rfc3339) {
         Ok(s) => Ok(Value::Text(s)),
         Err(e) => Err(Error::Bind {
            reason: format!("cannot format datetime: {e}"),
         }),
      }
   }
}

impl FromSql for OffsetDateTime {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Text(s) => OffsetDateTime::parse(s, &Rfc3339)
            .or_else(|_| parse_error("RFC 3339 datetime text", value)),
         Value::Null => Err(Error::UnexpectedNull {
            column: String::new(),
         }),
         other => parse_error("RFC 3339 datetime text", other),
      }
   }
}

impl ToSql for Date {
   fn to_sql(&self) -> Result<Value> {
      match self.format(&DATE_FORMAT) {
         Ok(s) => Ok(Value::Text(s)),
         Err(e) => Err(Error::Bind {
            reason: format!("cannot format date: {e}"),
         }),
      }
   }
}

impl FromSql for Date {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Text(s) => {
            Date::parse(s, &DATE_FORMAT).or_else(|_| parse_error("date text (YYYY-MM-DD)", value))
         }
         Value::Null => Err(Error::UnexpectedNull {
            column: String::new(),
         }),
         other => parse_error("date text", other),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use time::macros::{date, datetime};

   #[test]
   fn test_primitive_datetime_round_trip() {
      let dt = datetime!(2024-06-01 12:30:45);
      let value = dt.to_sql().unwrap();
      assert_eq!(value, Value::Text("2024-06-01 12:30:45".into()));
      assert_eq!(PrimitiveDateTime::from_sql(&value).unwrap(), dt);
   }

   #[test]
   fn test_offset_datetime_round_trip() {
      let dt = datetime!(2024-06-01 12:30:45 UTC);
      let value = dt.to_sql().unwrap();
      assert_eq!(OffsetDateTime::from_sql(&value).unwrap(), dt);
   }

   #[test]
   fn test_date_round_trip() {
      let d = date!(2023 - 11 - 05);
      let value = d.to_sql().unwrap();
      assert_eq!(value, Value::Text("2023-11-05".into()));
      assert_eq!(Date::from_sql(&value).unwrap(), d);
   }

   #[test]
   fn test_unparseable_text_is_a_mismatch() {
      let err = PrimitiveDateTime::from_sql(&Value::Text("not a date".into())).unwrap_err();
      assert!(matches!(err, Error::TypeMismatch { .. }), "got {err:?}");
   }

   #[test]
   fn test_wrong_storage_class() {
      assert!(Date::from_sql(&Value::Integer(1)).is_err());
      assert!(matches!(
         OffsetDateTime::from_sql(&Value::Null).unwrap_err(),
         Error::UnexpectedNull { .. }
      ));
   }
}
