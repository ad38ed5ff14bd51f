//! Built-in converters between the scalar semantic types

use super::{ConversionFunction, ConverterRegistry};
use crate::error::ConversionError;
use crate::value::{single_char, SemType, Value};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// Numeric widening and checked narrowing, text parsing and formatting,
/// and date/date-time conversions
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardConverters;

impl ConverterRegistry for StandardConverters {
    fn get_converter(&self, source: &SemType, target: &SemType) -> Option<ConversionFunction> {
        use SemType as T;

        let description = format!("{} -> {}", source, target);
        let target_ty = target.clone();
        let func: fn(Value, &SemType) -> Result<Value, ConversionError> = match (source, target) {
            (T::I32 | T::I64 | T::U64 | T::F64, T::I32 | T::I64 | T::U64 | T::F64) => numeric,
            (
                T::Bool | T::Char | T::I32 | T::I64 | T::U64 | T::F64 | T::Date | T::DateTime,
                T::String,
            ) => format,
            (
                T::String,
                T::Bool | T::Char | T::I32 | T::I64 | T::U64 | T::F64 | T::Date | T::DateTime,
            ) => parse,
            (T::Date, T::DateTime) | (T::DateTime, T::Date) => calendar,
            _ => return None,
        };
        Some(ConversionFunction::new(description, move |value| func(value, &target_ty)))
    }
}

fn mismatch(expected: &str, value: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        found: value.type_label(),
    }
}

fn out_of_range(value: &Value, target: &SemType) -> ConversionError {
    ConversionError::OutOfRange {
        value: value.to_string(),
        target: target.to_string(),
    }
}

/// Integral value of a number, if it has one
fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::I32(v) => Some(i128::from(*v)),
        Value::I64(v) => Some(i128::from(*v)),
        Value::U64(v) => Some(i128::from(*v)),
        Value::F64(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e38 => Some(*v as i128),
        _ => None,
    }
}

fn numeric(value: Value, target: &SemType) -> Result<Value, ConversionError> {
    if *target == SemType::F64 {
        return value
            .as_f64()
            .map(Value::F64)
            .ok_or_else(|| mismatch("number", &value));
    }
    if !matches!(value, Value::I32(_) | Value::I64(_) | Value::U64(_) | Value::F64(_)) {
        return Err(mismatch("number", &value));
    }
    let n = integral(&value).ok_or_else(|| out_of_range(&value, target))?;
    let converted = match target {
        SemType::I32 => i32::try_from(n).ok().map(Value::I32),
        SemType::I64 => i64::try_from(n).ok().map(Value::I64),
        SemType::U64 => u64::try_from(n).ok().map(Value::U64),
        _ => None,
    };
    converted.ok_or_else(|| out_of_range(&value, target))
}

fn format(value: Value, _target: &SemType) -> Result<Value, ConversionError> {
    Ok(Value::String(value.to_string()))
}

fn parse(value: Value, target: &SemType) -> Result<Value, ConversionError> {
    let text = match value {
        Value::String(text) => text,
        other => return Err(mismatch("string", &other)),
    };
    let trimmed = text.trim();
    let failed = || ConversionError::Parse {
        input: text.clone(),
        target: target.to_string(),
    };
    match target {
        SemType::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(failed()),
        },
        // chars are taken verbatim, whitespace included
        SemType::Char => single_char(&text).map(Value::Char).ok_or_else(failed),
        SemType::I32 => trimmed.parse().map(Value::I32).map_err(|_| failed()),
        SemType::I64 => trimmed.parse().map(Value::I64).map_err(|_| failed()),
        SemType::U64 => trimmed.parse().map(Value::U64).map_err(|_| failed()),
        SemType::F64 => trimmed.parse().map(Value::F64).map_err(|_| failed()),
        SemType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(|_| failed()),
        SemType::DateTime => DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
            .map_err(|_| failed()),
        _ => Err(failed()),
    }
}

fn calendar(value: Value, _target: &SemType) -> Result<Value, ConversionError> {
    match value {
        Value::Date(date) => Ok(Value::DateTime(date.and_time(NaiveTime::MIN).and_utc())),
        Value::DateTime(dt) => Ok(Value::Date(dt.date_naive())),
        other => Err(mismatch("date or datetime", &other)),
    }
}
