//! Runtime values and semantic types
//!
//! Every field read by the engine is lifted into a [`Value`]; every declared
//! field carries a [`FieldType`]. Rust types take part in mapping through the
//! [`ValueType`] trait, which is implemented here for the primitive types,
//! `String`, chrono dates, `Option<T>` (nullable) and `Value` itself (`Any`).
//! Single-value wrapper newtypes opt in with [`value_wrapper!`](crate::value_wrapper).

use crate::error::ConversionError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A dynamically typed field value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Char(char),
    I32(i32),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Wrapped(Box<Wrapped>),
}

/// A value held by a single-value wrapper type
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapped {
    pub type_name: Arc<str>,
    pub inner: Value,
}

/// Declared semantic type of a field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SemType {
    Bool,
    Char,
    I32,
    I64,
    U64,
    F64,
    String,
    Date,
    DateTime,
    Wrapper(Arc<WrapperType>),
    /// Unknown until a value is seen
    Any,
}

/// A single-value holder type: a name plus the type it wraps
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WrapperType {
    pub name: Arc<str>,
    pub inner: SemType,
}

/// Semantic type plus nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    #[serde(rename = "type")]
    pub ty: SemType,
    #[serde(default)]
    pub nullable: bool,
}

impl Value {
    /// Wrap `inner` as a value of the wrapper type `type_name`
    pub fn wrapped(type_name: impl Into<Arc<str>>, inner: Value) -> Self {
        Value::Wrapped(Box::new(Wrapped {
            type_name: type_name.into(),
            inner,
        }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime semantic type, `None` for null
    pub fn sem_type(&self) -> Option<SemType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => SemType::Bool,
            Value::Char(_) => SemType::Char,
            Value::I32(_) => SemType::I32,
            Value::I64(_) => SemType::I64,
            Value::U64(_) => SemType::U64,
            Value::F64(_) => SemType::F64,
            Value::String(_) => SemType::String,
            Value::Date(_) => SemType::Date,
            Value::DateTime(_) => SemType::DateTime,
            Value::Wrapped(w) => SemType::wrapper(
                w.type_name.clone(),
                w.inner.sem_type().unwrap_or(SemType::Any),
            ),
        })
    }

    /// Short label used in diagnostics
    pub fn type_label(&self) -> String {
        match self.sem_type() {
            Some(ty) => ty.to_string(),
            None => "null".to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(i64::from(*v)),
            Value::I64(v) => Some(*v),
            Value::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I32(v) => Some(f64::from(*v)),
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    /// Render as JSON. Dates use ISO-8601, date-times RFC 3339, wrappers their inner value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Char(c) => Json::String(c.to_string()),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::U64(v) => Json::from(*v),
            Value::F64(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Wrapped(w) => w.inner.to_json(),
        }
    }

    /// Read a JSON scalar as a value of the declared type.
    ///
    /// `Any` fields take the natural reading: integers become `I64` (or `U64`
    /// above `i64::MAX`), other numbers `F64`. Arrays and objects are rejected;
    /// shapes are flat.
    pub fn from_json(json: &serde_json::Value, ty: &FieldType) -> Result<Value, ConversionError> {
        use serde_json::Value as Json;

        let mismatch = || ConversionError::TypeMismatch {
            expected: ty.to_string(),
            found: json_label(json).to_string(),
        };

        if json.is_null() {
            return Ok(Value::Null);
        }

        match &ty.ty {
            SemType::Any => match json {
                Json::Bool(b) => Ok(Value::Bool(*b)),
                Json::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(Value::I64(i))
                    } else if let Some(u) = n.as_u64() {
                        Ok(Value::U64(u))
                    } else {
                        n.as_f64().map(Value::F64).ok_or_else(mismatch)
                    }
                }
                Json::String(s) => Ok(Value::String(s.clone())),
                _ => Err(mismatch()),
            },
            SemType::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            SemType::Char => {
                let s = json.as_str().ok_or_else(mismatch)?;
                single_char(s).map(Value::Char).ok_or_else(|| ConversionError::Parse {
                    input: s.to_string(),
                    target: "char".to_string(),
                })
            }
            SemType::I32 => {
                let n = json.as_i64().ok_or_else(mismatch)?;
                i32::try_from(n)
                    .map(Value::I32)
                    .map_err(|_| ConversionError::OutOfRange {
                        value: n.to_string(),
                        target: "i32".to_string(),
                    })
            }
            SemType::I64 => json.as_i64().map(Value::I64).ok_or_else(mismatch),
            SemType::U64 => json.as_u64().map(Value::U64).ok_or_else(mismatch),
            SemType::F64 => json.as_f64().map(Value::F64).ok_or_else(mismatch),
            SemType::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            SemType::Date => {
                let s = json.as_str().ok_or_else(mismatch)?;
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(Value::Date)
                    .map_err(|_| ConversionError::Parse {
                        input: s.to_string(),
                        target: "date".to_string(),
                    })
            }
            SemType::DateTime => {
                let s = json.as_str().ok_or_else(mismatch)?;
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                    .map_err(|_| ConversionError::Parse {
                        input: s.to_string(),
                        target: "datetime".to_string(),
                    })
            }
            SemType::Wrapper(w) => {
                let inner = Value::from_json(json, &FieldType::required(w.inner.clone()))?;
                Ok(Value::wrapped(w.name.clone(), inner))
            }
        }
    }
}

fn json_label(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub(crate) fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Wrapped(w) => write!(f, "{}", w.inner),
        }
    }
}

impl SemType {
    pub fn wrapper(name: impl Into<Arc<str>>, inner: SemType) -> Self {
        SemType::Wrapper(Arc::new(WrapperType {
            name: name.into(),
            inner,
        }))
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(self, SemType::Wrapper(_))
    }

    pub fn as_wrapper(&self) -> Option<&WrapperType> {
        match self {
            SemType::Wrapper(w) => Some(w),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SemType::I32 | SemType::I64 | SemType::U64 | SemType::F64)
    }
}

impl fmt::Display for SemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemType::Bool => write!(f, "bool"),
            SemType::Char => write!(f, "char"),
            SemType::I32 => write!(f, "i32"),
            SemType::I64 => write!(f, "i64"),
            SemType::U64 => write!(f, "u64"),
            SemType::F64 => write!(f, "f64"),
            SemType::String => write!(f, "string"),
            SemType::Date => write!(f, "date"),
            SemType::DateTime => write!(f, "datetime"),
            SemType::Wrapper(w) => write!(f, "{}({})", w.name, w.inner),
            SemType::Any => write!(f, "any"),
        }
    }
}

impl FromStr for SemType {
    type Err = String;

    /// Parses the names produced by `Display`, e.g. `i64`, `string`, `UserId(i64)`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(open) = s.find('(') {
            let inner = s[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| format!("unbalanced wrapper type '{}'", s))?;
            let name = s[..open].trim();
            if name.is_empty() {
                return Err(format!("wrapper type without a name: '{}'", s));
            }
            return Ok(SemType::wrapper(name, inner.parse()?));
        }
        match s.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(SemType::Bool),
            "char" => Ok(SemType::Char),
            "i32" | "int" => Ok(SemType::I32),
            "i64" | "long" => Ok(SemType::I64),
            "u64" => Ok(SemType::U64),
            "f64" | "double" | "float" => Ok(SemType::F64),
            "string" | "str" => Ok(SemType::String),
            "date" => Ok(SemType::Date),
            "datetime" | "timestamp" => Ok(SemType::DateTime),
            "any" => Ok(SemType::Any),
            other => Err(format!("unknown type '{}'", other)),
        }
    }
}

impl TryFrom<String> for SemType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SemType> for String {
    fn from(ty: SemType) -> Self {
        ty.to_string()
    }
}

impl FieldType {
    pub fn required(ty: SemType) -> Self {
        Self { ty, nullable: false }
    }

    pub fn nullable(ty: SemType) -> Self {
        Self { ty, nullable: true }
    }

    /// The `Any` type, which is always nullable
    pub fn any() -> Self {
        Self::nullable(SemType::Any)
    }

    pub fn involves_wrapper(&self) -> bool {
        self.ty.is_wrapper()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable && self.ty != SemType::Any {
            write!(f, "{}?", self.ty)
        } else {
            write!(f, "{}", self.ty)
        }
    }
}

/// Rust types that can be read from and written to shape fields
pub trait ValueType: Sized + Send + 'static {
    /// Declared type of fields of this Rust type
    fn field_type() -> FieldType;

    fn into_value(self) -> Value;

    /// Strict extraction; conversions have already happened upstream
    fn from_value(value: Value) -> Result<Self, ConversionError>;
}

macro_rules! primitive_value_type {
    ($($rust:ty => $variant:ident, $sem:ident;)*) => {
        $(
            impl ValueType for $rust {
                fn field_type() -> FieldType {
                    FieldType::required(SemType::$sem)
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(ConversionError::TypeMismatch {
                            expected: SemType::$sem.to_string(),
                            found: other.type_label(),
                        }),
                    }
                }
            }

            impl From<$rust> for Value {
                fn from(v: $rust) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

primitive_value_type! {
    bool => Bool, Bool;
    char => Char, Char;
    i32 => I32, I32;
    i64 => I64, I64;
    u64 => U64, U64;
    f64 => F64, F64;
    String => String, String;
    NaiveDate => Date, Date;
    DateTime<Utc> => DateTime, DateTime;
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn field_type() -> FieldType {
        FieldType::nullable(T::field_type().ty)
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl ValueType for Value {
    fn field_type() -> FieldType {
        FieldType::any()
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

/// Declare a single-field tuple struct as a wrapper type.
///
/// ```
/// use shapemap_core::value_wrapper;
///
/// #[derive(Debug, Clone, PartialEq)]
/// pub struct UserId(pub i64);
/// value_wrapper!(UserId, i64);
/// ```
#[macro_export]
macro_rules! value_wrapper {
    ($wrapper:ident, $inner:ty) => {
        impl $crate::value::ValueType for $wrapper {
            fn field_type() -> $crate::value::FieldType {
                $crate::value::FieldType::required($crate::value::SemType::wrapper(
                    stringify!($wrapper),
                    <$inner as $crate::value::ValueType>::field_type().ty,
                ))
            }

            fn into_value(self) -> $crate::value::Value {
                $crate::value::Value::wrapped(
                    stringify!($wrapper),
                    <$inner as $crate::value::ValueType>::into_value(self.0),
                )
            }

            fn from_value(
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::error::ConversionError> {
                match value {
                    $crate::value::Value::Wrapped(w) if &*w.type_name == stringify!($wrapper) => {
                        <$inner as $crate::value::ValueType>::from_value(w.inner).map($wrapper)
                    }
                    other => Err($crate::error::ConversionError::WrapperMismatch {
                        expected: stringify!($wrapper).to_string(),
                        found: other.type_label(),
                    }),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct OrderNo(String);
    value_wrapper!(OrderNo, String);

    #[test]
    fn test_sem_type_round_trips_through_text() {
        for text in ["i64", "string", "date", "any", "OrderNo(string)"] {
            let ty: SemType = text.parse().unwrap();
            assert_eq!(ty.to_string(), text);
        }
        assert!("Broken(i64".parse::<SemType>().is_err());
        assert!("decimal".parse::<SemType>().is_err());
    }

    #[test]
    fn test_option_is_nullable() {
        assert_eq!(<Option<i64>>::field_type(), FieldType::nullable(SemType::I64));
        assert_eq!(<Option<i64>>::from_value(Value::Null).unwrap(), None);
        assert_eq!(<Option<i64>>::from_value(Value::I64(4)).unwrap(), Some(4));
    }

    #[test]
    fn test_strict_extraction() {
        assert!(i64::from_value(Value::I32(1)).is_err());
        assert!(String::from_value(Value::Null).is_err());
    }

    #[test]
    fn test_wrapper_macro() {
        let ty = OrderNo::field_type();
        assert_eq!(ty.ty.to_string(), "OrderNo(string)");

        let value = OrderNo("A-1".into()).into_value();
        assert_eq!(value.type_label(), "OrderNo(string)");
        assert_eq!(OrderNo::from_value(value).unwrap(), OrderNo("A-1".into()));
        assert!(OrderNo::from_value(Value::from("A-1")).is_err());
    }

    #[test]
    fn test_json_reading() {
        let date = FieldType::required(SemType::Date);
        assert_eq!(
            Value::from_json(&json!("2024-02-29"), &date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(Value::from_json(&json!(7), &FieldType::any()).unwrap(), Value::I64(7));
        assert!(Value::from_json(&json!([1]), &FieldType::any()).is_err());
        assert!(Value::from_json(&json!(1i64 << 40), &FieldType::required(SemType::I32)).is_err());
        assert_eq!(Value::from_json(&json!(null), &date).unwrap(), Value::Null);
    }

    #[test]
    fn test_json_writing() {
        let dt = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Value::DateTime(dt).to_json(), json!("2024-01-02T03:04:05Z"));
        assert_eq!(Value::wrapped("OrderNo", Value::from("x")).to_json(), json!("x"));
        assert_eq!(Value::F64(f64::NAN).to_json(), json!(null));
    }
}
