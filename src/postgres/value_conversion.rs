//! Conversion of sea-query values into `may_postgres` parameters.
//!
//! Values are first collected into typed vectors, then borrowed as `ToSql`
//! trait objects; the borrowed parameters are only valid inside the closure.

use crate::executor::StorageError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert `values` to `ToSql` parameters and run `f` with them
///
/// # Errors
///
/// Returns `StorageError::Query` for value types that have no parameter mapping,
/// or whatever `f` returns.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, StorageError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, StorageError>,
{
    let mut bools: Vec<bool> = Vec::new();
    let mut ints: Vec<i32> = Vec::new();
    let mut big_ints: Vec<i64> = Vec::new();
    let mut strings: Vec<String> = Vec::new();
    let mut bytes: Vec<Vec<u8>> = Vec::new();
    let mut doubles: Vec<f64> = Vec::new();
    let nulls: Vec<Option<String>> = vec![None];

    for value in values {
        match value {
            Value::Bool(Some(b)) => bools.push(*b),
            Value::TinyInt(Some(i)) => ints.push(i32::from(*i)),
            Value::SmallInt(Some(i)) => ints.push(i32::from(*i)),
            Value::Int(Some(i)) => ints.push(*i),
            Value::BigInt(Some(i)) => big_ints.push(*i),
            Value::TinyUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::SmallUnsigned(Some(u)) => ints.push(i32::from(*u)),
            Value::Unsigned(Some(u)) => big_ints.push(i64::from(*u)),
            Value::BigUnsigned(Some(u)) => {
                let converted = i64::try_from(*u).map_err(|_| {
                    StorageError::Query(format!(
                        "BigUnsigned value {} exceeds i64::MAX, cannot be bound as BIGINT",
                        u
                    ))
                })?;
                big_ints.push(converted);
            }
            Value::Float(Some(f)) => doubles.push(f64::from(*f)),
            Value::Double(Some(d)) => doubles.push(*d),
            Value::String(Some(s)) => strings.push(s.clone()),
            Value::Bytes(Some(b)) => bytes.push(b.clone()),
            Value::Bool(None)
            | Value::TinyInt(None)
            | Value::SmallInt(None)
            | Value::Int(None)
            | Value::BigInt(None)
            | Value::TinyUnsigned(None)
            | Value::SmallUnsigned(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None)
            | Value::Float(None)
            | Value::Double(None)
            | Value::String(None)
            | Value::Bytes(None) => {}
            _ => {
                return Err(StorageError::Query(format!(
                    "Unsupported value type in statement: {:?}",
                    value
                )));
            }
        }
    }

    let (mut bool_idx, mut int_idx, mut big_int_idx) = (0, 0, 0);
    let (mut string_idx, mut byte_idx, mut double_idx) = (0, 0, 0);
    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Value::Bool(Some(_)) => {
                params.push(&bools[bool_idx]);
                bool_idx += 1;
            }
            Value::TinyInt(Some(_))
            | Value::SmallInt(Some(_))
            | Value::Int(Some(_))
            | Value::TinyUnsigned(Some(_))
            | Value::SmallUnsigned(Some(_)) => {
                params.push(&ints[int_idx]);
                int_idx += 1;
            }
            Value::BigInt(Some(_)) | Value::Unsigned(Some(_)) | Value::BigUnsigned(Some(_)) => {
                params.push(&big_ints[big_int_idx]);
                big_int_idx += 1;
            }
            Value::Float(Some(_)) | Value::Double(Some(_)) => {
                params.push(&doubles[double_idx]);
                double_idx += 1;
            }
            Value::String(Some(_)) => {
                params.push(&strings[string_idx]);
                string_idx += 1;
            }
            Value::Bytes(Some(_)) => {
                params.push(&bytes[byte_idx]);
                byte_idx += 1;
            }
            _ => params.push(&nulls[0]),
        }
    }

    f(&params)
}
