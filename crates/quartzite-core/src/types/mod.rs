//! Typed binding and extraction between host types and SQLite values.
//!
//! [`ToSql`] maps a host value into a [`Value`] for binding; [`FromSql`] is
//! its inverse for extraction. Conversions are explicit: a cell whose stored
//! type does not match the target fails with a type mismatch rather than
//! being coerced, with two deliberate exceptions noted on the impls
//! (integers widen into `f64`, and `bool` follows SQL's liberal truthiness
//! rule for integers).

mod json;
mod time;

use crate::error::{Error, Result};
use crate::value::Value;

/// Conversion from a host type into a [`Value`] for binding.
pub trait ToSql {
   fn to_sql(&self) -> Result<Value>;
}

/// Conversion from a [`Value`] back into a host type.
///
/// Implementations do not know which column they serve; the row/statement
/// layer fills in the column name on `UnexpectedNull` errors.
pub trait FromSql: Sized {
   fn from_sql(value: &Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
   Err(Error::TypeMismatch {
      expected: expected.to_string(),
      actual: value.type_name().to_string(),
   })
}

fn null_error<T>() -> Result<T> {
   Err(Error::UnexpectedNull {
      column: String::new(),
   })
}

// --- ToSql ---

impl ToSql for Value {
   fn to_sql(&self) -> Result<Value> {
      Ok(self.clone())
   }
}

impl ToSql for bool {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Integer(*self as i64))
   }
}

macro_rules! to_sql_integer {
   ($($t:ty),*) => {
      $(impl ToSql for $t {
         fn to_sql(&self) -> Result<Value> {
            Ok(Value::Integer(*self as i64))
         }
      })*
   };
}

to_sql_integer!(i8, i16, i32, i64, u8, u16, u32);

impl ToSql for u64 {
   fn to_sql(&self) -> Result<Value> {
      i64::try_from(*self)
         .map(Value::Integer)
         .map_err(|_| Error::Bind {
            reason: format!("unsigned value {self} does not fit a 64-bit signed integer"),
         })
   }
}

impl ToSql for usize {
   fn to_sql(&self) -> Result<Value> {
      (*self as u64).to_sql()
   }
}

impl ToSql for f64 {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Real(*self))
   }
}

impl ToSql for f32 {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Real(f64::from(*self)))
   }
}

impl ToSql for str {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Text(self.to_string()))
   }
}

impl ToSql for String {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Text(self.clone()))
   }
}

impl ToSql for [u8] {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Blob(self.to_vec()))
   }
}

impl ToSql for Vec<u8> {
   fn to_sql(&self) -> Result<Value> {
      Ok(Value::Blob(self.clone()))
   }
}

impl<T: ToSql> ToSql for Option<T> {
   fn to_sql(&self) -> Result<Value> {
      match self {
         Some(inner) => inner.to_sql(),
         None => Ok(Value::Null),
      }
   }
}

impl<T: ToSql + ?Sized> ToSql for &T {
   fn to_sql(&self) -> Result<Value> {
      (**self).to_sql()
   }
}

// --- FromSql ---

impl FromSql for Value {
   fn from_sql(value: &Value) -> Result<Self> {
      Ok(value.clone())
   }
}

impl FromSql for i64 {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Integer(i) => Ok(*i),
         Value::Null => null_error(),
         other => mismatch("integer", other),
      }
   }
}

impl FromSql for i32 {
   fn from_sql(value: &Value) -> Result<Self> {
      let wide = i64::from_sql(value)?;
      i32::try_from(wide).or_else(|_| mismatch("32-bit integer", value))
   }
}

impl FromSql for u32 {
   fn from_sql(value: &Value) -> Result<Self> {
      let wide = i64::from_sql(value)?;
      u32::try_from(wide).or_else(|_| mismatch("unsigned 32-bit integer", value))
   }
}

impl FromSql for u64 {
   fn from_sql(value: &Value) -> Result<Self> {
      let wide = i64::from_sql(value)?;
      u64::try_from(wide).or_else(|_| mismatch("unsigned integer", value))
   }
}

impl FromSql for f64 {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Real(r) => Ok(*r),
         // Integers widen losslessly enough for SQL's numeric lattice.
         Value::Integer(i) => Ok(*i as f64),
         Value::Null => null_error(),
         other => mismatch("real", other),
      }
   }
}

impl FromSql for String {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Text(s) => Ok(s.clone()),
         Value::Null => null_error(),
         other => mismatch("text", other),
      }
   }
}

impl FromSql for Vec<u8> {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Blob(b) => Ok(b.clone()),
         Value::Null => null_error(),
         other => mismatch("blob", other),
      }
   }
}

impl FromSql for bool {
   /// SQL booleans are liberal: 0 is false, any other integer is true, and
   /// NULL reads as false. Text is never coerced to a boolean.
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Integer(i) => Ok(*i != 0),
         Value::Null => Ok(false),
         other => mismatch("boolean", other),
      }
   }
}

impl<T: FromSql> FromSql for Option<T> {
   fn from_sql(value: &Value) -> Result<Self> {
      match value {
         Value::Null => Ok(None),
         other => T::from_sql(other).map(Some),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_to_sql_primitives() {
      assert_eq!(42i64.to_sql().unwrap(), Value::Integer(42));
      assert_eq!(7u16.to_sql().unwrap(), Value::Integer(7));
      assert_eq!(true.to_sql().unwrap(), Value::Integer(1));
      assert_eq!(false.to_sql().unwrap(), Value::Integer(0));
      assert_eq!(1.5f64.to_sql().unwrap(), Value::Real(1.5));
      assert_eq!("hi".to_sql().unwrap(), Value::Text("hi".into()));
      assert_eq!(
         vec![1u8, 2].to_sql().unwrap(),
         Value::Blob(vec![1, 2])
      );
      assert_eq!(None::<i64>.to_sql().unwrap(), Value::Null);
      assert_eq!(Some(9i64).to_sql().unwrap(), Value::Integer(9));
   }

   #[test]
   fn test_to_sql_u64_overflow() {
      assert_eq!(5u64.to_sql().unwrap(), Value::Integer(5));
      let err = u64::MAX.to_sql().unwrap_err();
      assert!(matches!(err, Error::Bind { .. }), "got {err:?}");
   }

   #[test]
   fn test_from_sql_round_trips() {
      assert_eq!(i64::from_sql(&Value::Integer(3)).unwrap(), 3);
      assert_eq!(f64::from_sql(&Value::Real(0.5)).unwrap(), 0.5);
      assert_eq!(
         String::from_sql(&Value::Text("s".into())).unwrap(),
         "s"
      );
      assert_eq!(
         Vec::<u8>::from_sql(&Value::Blob(vec![0])).unwrap(),
         vec![0]
      );
   }

   #[test]
   fn test_integer_widens_to_real_only() {
      assert_eq!(f64::from_sql(&Value::Integer(2)).unwrap(), 2.0);
      // The reverse direction is a mismatch.
      assert!(i64::from_sql(&Value::Real(2.0)).is_err());
   }

   #[test]
   fn test_narrowing_checks() {
      assert_eq!(i32::from_sql(&Value::Integer(1)).unwrap(), 1);
      assert!(i32::from_sql(&Value::Integer(i64::MAX)).is_err());
      assert!(u32::from_sql(&Value::Integer(-1)).is_err());
      assert!(u64::from_sql(&Value::Integer(-1)).is_err());
   }

   #[test]
   fn test_bool_liberal_rule() {
      assert!(!bool::from_sql(&Value::Integer(0)).unwrap());
      assert!(bool::from_sql(&Value::Integer(1)).unwrap());
      assert!(bool::from_sql(&Value::Integer(-3)).unwrap());
      // NULL reads as false rather than an error.
      assert!(!bool::from_sql(&Value::Null).unwrap());
      // Text is not coerced.
      assert!(bool::from_sql(&Value::Text("true".into())).is_err());
   }

   #[test]
   fn test_option_maps_null() {
      assert_eq!(Option::<i64>::from_sql(&Value::Null).unwrap(), None);
      assert_eq!(
         Option::<i64>::from_sql(&Value::Integer(4)).unwrap(),
         Some(4)
      );
      // Inner mismatches still surface.
      assert!(Option::<i64>::from_sql(&Value::Text("x".into())).is_err());
   }

   #[test]
   fn test_null_into_required_type() {
      assert!(matches!(
         i64::from_sql(&Value::Null).unwrap_err(),
         Error::UnexpectedNull { .. }
      ));
      assert!(matches!(
         String::from_sql(&Value::Null).unwrap_err(),
         Error::UnexpectedNull { .. }
      ));
   }
}
