//! JSON-safe value coercion
//!
//! Result cells are decoded from the binary wire format into JSON scalars:
//! - bool, integers and finite floats stay JSON primitives (NaN/Infinity become null)
//! - `NUMERIC` becomes its exact decimal string
//! - JSON/JSONB, timestamps, dates, times, intervals and UUIDs are stringified;
//!   infinite timestamps and dates become `"infinity"` / `"-infinity"`
//! - `BYTEA` is Base64-encoded
//! - arrays are stringified as JSON arrays of their decoded elements
//! - anything else is passed through as text when the payload is UTF-8 (enums,
//!   `citext`, `xml`, ...) and Base64-encoded otherwise

use std::error::Error as StdError;
use std::fmt::Write as _;

use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::Row;

use crate::error::{Result, SchemataError};

type BoxError = Box<dyn StdError + Sync + Send>;

/// A decoded cell; accepts every PostgreSQL type
struct JsonCell(Value);

impl<'a> FromSql<'a> for JsonCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        decode(ty, raw).map(JsonCell)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Convert a `PostgreSQL` row to a JSON-safe `Vec` in column order
pub(super) fn row_to_json(row: &Row) -> Result<Vec<Value>> {
    (0..row.len())
        .map(|idx| {
            row.try_get::<_, Option<JsonCell>>(idx)
                .map(|cell| cell.map_or(Value::Null, |cell| cell.0))
                .map_err(|e| conversion_error(row.columns()[idx].name(), &e))
        })
        .collect()
}

/// The driver's message names only the column index; the decode cause is its source
fn conversion_error(column: &str, err: &dyn StdError) -> SchemataError {
    let cause = err.source().map(|source| format!(": {source}")).unwrap_or_default();
    SchemataError::execution(format!("Failed to convert column '{column}' to JSON: {err}{cause}"))
}

fn decode(ty: &Type, raw: &[u8]) -> std::result::Result<Value, BoxError> {
    if matches!(*ty, Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE) {
        if let Some(label) = infinity(raw) {
            return Ok(Value::String(label.to_string()));
        }
    }

    let value = match *ty {
        Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
        Type::INT2 => Value::from(i16::from_sql(ty, raw)?),
        Type::INT4 => Value::from(i32::from_sql(ty, raw)?),
        Type::INT8 => Value::from(i64::from_sql(ty, raw)?),
        Type::OID => Value::from(u32::from_sql(ty, raw)?),
        Type::FLOAT4 => finite(f64::from(f32::from_sql(ty, raw)?)),
        Type::FLOAT8 => finite(f64::from_sql(ty, raw)?),
        Type::NUMERIC => Value::String(numeric_to_string(raw)?),
        Type::JSON | Type::JSONB => Value::String(Value::from_sql(ty, raw)?.to_string()),
        Type::BYTEA => Value::String(base64::engine::general_purpose::STANDARD.encode(raw)),
        Type::TIMESTAMP => Value::String(NaiveDateTime::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMPTZ => Value::String(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
        Type::DATE => Value::String(NaiveDate::from_sql(ty, raw)?.to_string()),
        Type::TIME => Value::String(NaiveTime::from_sql(ty, raw)?.to_string()),
        Type::UUID => Value::String(uuid::Uuid::from_sql(ty, raw)?.to_string()),
        Type::INTERVAL => Value::String(interval_to_string(raw)?),
        _ => match ty.kind() {
            Kind::Array(element) => Value::String(array_to_string(element, raw)?),
            Kind::Domain(base) => decode(base, raw)?,
            _ => match std::str::from_utf8(raw) {
                Ok(text) => Value::String(text.to_owned()),
                Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(raw)),
            },
        },
    };
    Ok(value)
}

/// `infinity` / `-infinity` sentinels of timestamps (i64) and dates (i32)
fn infinity(raw: &[u8]) -> Option<&'static str> {
    match raw {
        [0x7f, rest @ ..] if rest.iter().all(|b| *b == 0xff) => Some("infinity"),
        [0x80, rest @ ..] if rest.iter().all(|b| *b == 0x00) => Some("-infinity"),
        _ => None,
    }
}

fn finite(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

fn take<const N: usize>(buf: &mut &[u8]) -> std::result::Result<[u8; N], BoxError> {
    let (head, rest) = buf.split_first_chunk::<N>().ok_or("unexpected end of value")?;
    *buf = rest;
    Ok(*head)
}

/// Render the binary `NUMERIC` format (base-10000 digits) as a decimal string
fn numeric_to_string(raw: &[u8]) -> std::result::Result<String, BoxError> {
    const NEGATIVE: u16 = 0x4000;

    let mut buf = raw;
    let ndigits = i16::from_be_bytes(take(&mut buf)?);
    let weight = i32::from(i16::from_be_bytes(take(&mut buf)?));
    let sign = u16::from_be_bytes(take(&mut buf)?);
    let dscale = u16::from_be_bytes(take(&mut buf)?);

    match sign {
        0xC000 => return Ok("NaN".to_string()),
        0xD000 => return Ok("Infinity".to_string()),
        0xF000 => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits.max(0))
        .map(|_| take(&mut buf).map(i16::from_be_bytes))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    // Digit k carries the exponent (weight - k) in base 10000.
    let digit_at =
        |k: i32| usize::try_from(k).ok().and_then(|k| digits.get(k).copied()).unwrap_or(0);

    let mut out = String::new();
    if sign == NEGATIVE {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        for k in 0..=weight {
            if k == 0 {
                write!(out, "{}", digit_at(k))?;
            } else {
                write!(out, "{:04}", digit_at(k))?;
            }
        }
    }

    if dscale > 0 {
        let groups = (i32::from(dscale) + 3) / 4;
        let mut fraction = String::with_capacity(groups as usize * 4);
        for j in 0..groups {
            write!(fraction, "{:04}", digit_at(weight + 1 + j))?;
        }
        fraction.truncate(usize::from(dscale));
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

/// Render the binary `INTERVAL` format the way `psql` prints it
fn interval_to_string(raw: &[u8]) -> std::result::Result<String, BoxError> {
    let mut buf = raw;
    let micros = i64::from_be_bytes(take(&mut buf)?);
    let days = i32::from_be_bytes(take(&mut buf)?);
    let months = i32::from_be_bytes(take(&mut buf)?);

    let unit = |n: i32, name: &str| {
        if n.abs() == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    };

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if days != 0 {
        parts.push(unit(days, "day"));
    }

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
        let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    Ok(parts.join(" "))
}

/// Decode a binary array (any dimensionality) into JSON text
fn array_to_string(element: &Type, raw: &[u8]) -> std::result::Result<String, BoxError> {
    let mut buf = raw;
    let ndim = i32::from_be_bytes(take(&mut buf)?);
    let _has_nulls = i32::from_be_bytes(take(&mut buf)?);
    let _element_oid = u32::from_be_bytes(take(&mut buf)?);

    let mut dims = Vec::with_capacity(usize::try_from(ndim)?);
    for _ in 0..ndim {
        let len = i32::from_be_bytes(take(&mut buf)?);
        let _lower_bound = i32::from_be_bytes(take(&mut buf)?);
        dims.push(usize::try_from(len)?);
    }

    let total: usize = if dims.is_empty() { 0 } else { dims.iter().product() };
    let mut items = Vec::with_capacity(total);
    for _ in 0..total {
        let len = i32::from_be_bytes(take(&mut buf)?);
        if len < 0 {
            items.push(Value::Null);
            continue;
        }
        let len = usize::try_from(len)?;
        if buf.len() < len {
            return Err("truncated array element".into());
        }
        let (item, rest) = buf.split_at(len);
        items.push(decode(element, item)?);
        buf = rest;
    }

    Ok(nest(&dims, items).to_string())
}

fn nest(dims: &[usize], items: Vec<Value>) -> Value {
    match dims.split_first() {
        Some((_, inner)) if !inner.is_empty() => {
            let stride: usize = inner.iter().product::<usize>().max(1);
            Value::Array(items.chunks(stride).map(|chunk| nest(inner, chunk.to_vec())).collect())
        }
        _ => Value::Array(items),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn numeric(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    fn interval(micros: i64, days: i32, months: i32) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&micros.to_be_bytes());
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        raw
    }

    #[test]
    fn test_primitives_stay_primitive() {
        assert_eq!(decode(&Type::BOOL, &[1]).unwrap(), json!(true));
        assert_eq!(decode(&Type::INT4, &42i32.to_be_bytes()).unwrap(), json!(42));
        assert_eq!(decode(&Type::INT8, &(-7i64).to_be_bytes()).unwrap(), json!(-7));
        assert_eq!(decode(&Type::FLOAT8, &1.5f64.to_be_bytes()).unwrap(), json!(1.5));
        assert_eq!(decode(&Type::TEXT, b"hello").unwrap(), json!("hello"));
    }

    #[test]
    fn test_non_finite_floats_become_null() {
        assert_eq!(decode(&Type::FLOAT8, &f64::NAN.to_be_bytes()).unwrap(), Value::Null);
        assert_eq!(decode(&Type::FLOAT4, &f32::INFINITY.to_be_bytes()).unwrap(), Value::Null);
    }

    #[test]
    fn test_numeric_rendering() {
        // 123.45
        assert_eq!(numeric_to_string(&numeric(2, 0, 0, 2, &[123, 4500])).unwrap(), "123.45");
        // -0.0001
        assert_eq!(numeric_to_string(&numeric(1, -1, 0x4000, 4, &[1])).unwrap(), "-0.0001");
        // 0.00001
        assert_eq!(numeric_to_string(&numeric(1, -2, 0, 5, &[1000])).unwrap(), "0.00001");
        // 10000
        assert_eq!(numeric_to_string(&numeric(1, 1, 0, 0, &[1])).unwrap(), "10000");
        // 12345678.90
        assert_eq!(
            numeric_to_string(&numeric(3, 1, 0, 2, &[1234, 5678, 9000])).unwrap(),
            "12345678.90"
        );
        // 0
        assert_eq!(numeric_to_string(&numeric(0, 0, 0, 0, &[])).unwrap(), "0");
        assert_eq!(numeric_to_string(&numeric(0, 0, 0xC000, 0, &[])).unwrap(), "NaN");
    }

    #[test]
    fn test_numeric_is_stringified() {
        let raw = numeric(2, 0, 0, 2, &[3, 1400]);
        assert_eq!(decode(&Type::NUMERIC, &raw).unwrap(), json!("3.14"));
    }

    #[test]
    fn test_truncated_numeric_is_an_error() {
        assert!(numeric_to_string(&[0, 1]).is_err());
    }

    #[test]
    fn test_interval_rendering() {
        assert_eq!(interval_to_string(&interval(0, 0, 0)).unwrap(), "00:00:00");
        assert_eq!(interval_to_string(&interval(0, 3, 14)).unwrap(), "1 year 2 mons 3 days");
        assert_eq!(interval_to_string(&interval(3_723_500_000, 1, 0)).unwrap(), "1 day 01:02:03.5");
        assert_eq!(interval_to_string(&interval(-60_000_000, 0, 0)).unwrap(), "-00:01:00");
    }

    #[test]
    fn test_infinite_timestamps_and_dates() {
        assert_eq!(decode(&Type::TIMESTAMP, &i64::MAX.to_be_bytes()).unwrap(), json!("infinity"));
        assert_eq!(decode(&Type::TIMESTAMPTZ, &i64::MIN.to_be_bytes()).unwrap(), json!("-infinity"));
        assert_eq!(decode(&Type::DATE, &i32::MAX.to_be_bytes()).unwrap(), json!("infinity"));
        assert_eq!(decode(&Type::DATE, &i32::MIN.to_be_bytes()).unwrap(), json!("-infinity"));
        // one microsecond short of the sentinel is an ordinary (out of range) value
        assert_ne!(
            decode(&Type::TIMESTAMP, &(i64::MAX - 1).to_be_bytes()).ok(),
            Some(json!("infinity"))
        );
    }

    #[derive(Debug, thiserror::Error)]
    #[error("error deserializing column 0")]
    struct Deserializing(#[source] BoxError);

    #[test]
    fn test_conversion_error_carries_cause() {
        let err = Deserializing("value too large to decode".into());
        assert_eq!(
            conversion_error("total", &err).message(),
            "Execution failed: Failed to convert column 'total' to JSON: \
             error deserializing column 0: value too large to decode"
        );
    }

    #[test]
    fn test_bytea_is_base64() {
        assert_eq!(decode(&Type::BYTEA, b"hi").unwrap(), json!("aGk="));
    }

    #[test]
    fn test_json_is_stringified() {
        let raw = br#"{"a":1}"#;
        assert_eq!(decode(&Type::JSON, raw).unwrap(), json!(r#"{"a":1}"#));
    }

    #[test]
    fn test_timestamp_and_date_are_stringified() {
        // 2000-01-02 00:00:00 (one day after the PostgreSQL epoch)
        let micros: i64 = 86_400_000_000;
        assert_eq!(
            decode(&Type::TIMESTAMP, &micros.to_be_bytes()).unwrap(),
            json!("2000-01-02 00:00:00")
        );
        assert_eq!(decode(&Type::DATE, &1i32.to_be_bytes()).unwrap(), json!("2000-01-02"));
    }

    #[test]
    fn test_unknown_types_fall_back() {
        let enum_like = Type::new("mood".into(), 99_999, Kind::Enum(vec!["happy".into()]), "public".into());
        assert_eq!(decode(&enum_like, b"happy").unwrap(), json!("happy"));

        let opaque = Type::new("blob".into(), 99_998, Kind::Simple, "public".into());
        assert_eq!(decode(&opaque, &[0xff, 0xfe]).unwrap(), json!("//4="));
    }

    #[test]
    fn test_int_array_is_stringified() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_be_bytes()); // ndim
        raw.extend_from_slice(&1i32.to_be_bytes()); // has nulls
        raw.extend_from_slice(&23u32.to_be_bytes()); // int4
        raw.extend_from_slice(&3i32.to_be_bytes()); // len
        raw.extend_from_slice(&1i32.to_be_bytes()); // lower bound
        for item in [Some(1i32), None, Some(3)] {
            match item {
                Some(v) => {
                    raw.extend_from_slice(&4i32.to_be_bytes());
                    raw.extend_from_slice(&v.to_be_bytes());
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        assert_eq!(decode(&Type::INT4_ARRAY, &raw).unwrap(), json!("[1,null,3]"));
    }

    #[test]
    fn test_empty_array() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&25u32.to_be_bytes());
        assert_eq!(decode(&Type::TEXT_ARRAY, &raw).unwrap(), json!("[]"));
    }

    #[test]
    fn test_nest_two_dimensions() {
        let items = vec![json!(1), json!(2), json!(3), json!(4)];
        assert_eq!(nest(&[2, 2], items), json!([[1, 2], [3, 4]]));
    }
}
