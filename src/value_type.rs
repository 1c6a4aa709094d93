// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mapping between scalar wire values and typed relational columns.
//!
//! Property and Range values are stored in one of six typed columns chosen by
//! the declared XSD type, so the store can index and compare them natively.
//! The text is kept verbatim inside the chosen column; reading maps it back
//! unchanged.
//!
//! The mapper is injected into the handler registry as a trait object, so
//! deployments can swap in stricter lexical validation.

use crate::error::StoreError;
use crate::model::DataTypeDefXsd;

/// Which typed column a value lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueColumn {
    Text,
    Numeric,
    Boolean,
    Time,
    Date,
    DateTime,
}

impl ValueColumn {
    pub const ALL: [ValueColumn; 6] = [
        ValueColumn::Text,
        ValueColumn::Numeric,
        ValueColumn::Boolean,
        ValueColumn::Time,
        ValueColumn::Date,
        ValueColumn::DateTime,
    ];

    /// Column name suffix (`value_text`, `min_numeric`, ...).
    pub fn suffix(&self) -> &'static str {
        match self {
            ValueColumn::Text => "text",
            ValueColumn::Numeric => "numeric",
            ValueColumn::Boolean => "boolean",
            ValueColumn::Time => "time",
            ValueColumn::Date => "date",
            ValueColumn::DateTime => "datetime",
        }
    }

    pub fn for_type(value_type: DataTypeDefXsd) -> Self {
        use DataTypeDefXsd as X;
        match value_type {
            X::Byte | X::Short | X::Int | X::Integer | X::Long | X::UnsignedByte
            | X::UnsignedShort | X::UnsignedInt | X::UnsignedLong | X::PositiveInteger
            | X::NegativeInteger | X::NonNegativeInteger | X::NonPositiveInteger
            | X::Decimal | X::Double | X::Float => ValueColumn::Numeric,
            X::Boolean => ValueColumn::Boolean,
            X::Time => ValueColumn::Time,
            X::Date => ValueColumn::Date,
            X::DateTime | X::Duration | X::GDay | X::GMonth | X::GMonthDay | X::GYear
            | X::GYearMonth => ValueColumn::DateTime,
            X::String | X::AnyUri | X::Base64Binary | X::HexBinary => ValueColumn::Text,
        }
    }
}

/// A scalar spread over the typed columns; at most one is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypedValue {
    pub text: Option<String>,
    pub numeric: Option<String>,
    pub boolean: Option<String>,
    pub time: Option<String>,
    pub date: Option<String>,
    pub datetime: Option<String>,
}

impl TypedValue {
    pub fn get(&self, column: ValueColumn) -> Option<&String> {
        match column {
            ValueColumn::Text => self.text.as_ref(),
            ValueColumn::Numeric => self.numeric.as_ref(),
            ValueColumn::Boolean => self.boolean.as_ref(),
            ValueColumn::Time => self.time.as_ref(),
            ValueColumn::Date => self.date.as_ref(),
            ValueColumn::DateTime => self.datetime.as_ref(),
        }
    }

    pub fn set(&mut self, column: ValueColumn, value: Option<String>) {
        let slot = match column {
            ValueColumn::Text => &mut self.text,
            ValueColumn::Numeric => &mut self.numeric,
            ValueColumn::Boolean => &mut self.boolean,
            ValueColumn::Time => &mut self.time,
            ValueColumn::Date => &mut self.date,
            ValueColumn::DateTime => &mut self.datetime,
        };
        *slot = value;
    }

    /// Values in `ValueColumn::ALL` order, for binding.
    pub fn columns(&self) -> [Option<String>; 6] {
        ValueColumn::ALL.map(|c| self.get(c).cloned())
    }
}

pub trait ValueTypeMapper: Send + Sync {
    /// Place a wire value into its typed column. Empty strings map to NULL.
    fn to_columns(&self, value_type: DataTypeDefXsd, value: Option<&str>) -> Result<TypedValue, StoreError>;

    /// Read the wire value back from the typed columns.
    fn from_columns(&self, value_type: DataTypeDefXsd, typed: &TypedValue) -> Option<String>;
}

/// Default mapper: XSD column selection with lexical checks for numbers and booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct XsdValueMapper;

impl ValueTypeMapper for XsdValueMapper {
    fn to_columns(&self, value_type: DataTypeDefXsd, value: Option<&str>) -> Result<TypedValue, StoreError> {
        let mut typed = TypedValue::default();
        let value = match value {
            Some(v) if !v.is_empty() => v,
            _ => return Ok(typed),
        };
        check_lexical(value_type, value)?;
        typed.set(ValueColumn::for_type(value_type), Some(value.to_string()));
        Ok(typed)
    }

    fn from_columns(&self, value_type: DataTypeDefXsd, typed: &TypedValue) -> Option<String> {
        typed.get(ValueColumn::for_type(value_type)).cloned()
    }
}

fn check_lexical(value_type: DataTypeDefXsd, value: &str) -> Result<(), StoreError> {
    use DataTypeDefXsd as X;
    let ok = match value_type {
        X::Byte | X::Short | X::Int | X::Integer | X::Long | X::PositiveInteger
        | X::NegativeInteger | X::NonNegativeInteger | X::NonPositiveInteger => is_integer(value, true),
        X::UnsignedByte | X::UnsignedShort | X::UnsignedInt | X::UnsignedLong => is_integer(value, false),
        X::Decimal => is_decimal(value),
        X::Double | X::Float => matches!(value, "INF" | "-INF" | "NaN") || is_decimal_or_exp(value),
        X::Boolean => matches!(value, "true" | "false" | "1" | "0"),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::BadRequest(format!("value '{}' is not a valid {}", value, value_type)))
    }
}

fn is_integer(value: &str, signed: bool) -> bool {
    let digits = match value.strip_prefix('-') {
        Some(rest) if signed => rest,
        Some(_) => return false,
        None => value.strip_prefix('+').unwrap_or(value),
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(|c: char| c == '-' || c == '+').unwrap_or(value);
    let mut parts = unsigned.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");
    (!int_part.is_empty() || !frac_part.is_empty())
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit())
}

fn is_decimal_or_exp(value: &str) -> bool {
    match value.split_once(|c: char| c == 'e' || c == 'E') {
        Some((mantissa, exp)) => is_decimal(mantissa) && is_integer(exp, true),
        None => is_decimal(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_selection() {
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::String), ValueColumn::Text);
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::UnsignedLong), ValueColumn::Numeric);
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::Boolean), ValueColumn::Boolean);
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::Time), ValueColumn::Time);
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::Date), ValueColumn::Date);
        assert_eq!(ValueColumn::for_type(DataTypeDefXsd::GYearMonth), ValueColumn::DateTime);
    }

    #[test]
    fn test_round_trip_keeps_text_verbatim() {
        let mapper = XsdValueMapper;
        for (t, v) in [
            (DataTypeDefXsd::Int, "007"),
            (DataTypeDefXsd::Double, "1.50e3"),
            (DataTypeDefXsd::Boolean, "true"),
            (DataTypeDefXsd::DateTime, "2024-01-01T00:00:00Z"),
            (DataTypeDefXsd::String, "hello"),
        ] {
            let typed = mapper.to_columns(t, Some(v)).unwrap();
            assert_eq!(mapper.from_columns(t, &typed).as_deref(), Some(v));
        }
    }

    #[test]
    fn test_empty_maps_to_null() {
        let typed = XsdValueMapper.to_columns(DataTypeDefXsd::Int, Some("")).unwrap();
        assert_eq!(typed, TypedValue::default());
        let typed = XsdValueMapper.to_columns(DataTypeDefXsd::Int, None).unwrap();
        assert_eq!(typed.columns(), [None, None, None, None, None, None]);
    }

    #[test]
    fn test_lexical_errors_are_bad_requests() {
        let mapper = XsdValueMapper;
        assert!(mapper.to_columns(DataTypeDefXsd::Int, Some("one")).unwrap_err().is_bad_request());
        assert!(mapper.to_columns(DataTypeDefXsd::UnsignedInt, Some("-1")).is_err());
        assert!(mapper.to_columns(DataTypeDefXsd::Boolean, Some("yes")).is_err());
        assert!(mapper.to_columns(DataTypeDefXsd::Decimal, Some("1.2.3")).is_err());
        assert!(mapper.to_columns(DataTypeDefXsd::Decimal, Some(".")).is_err());
        assert!(mapper.to_columns(DataTypeDefXsd::Double, Some("NaN")).is_ok());
        assert!(mapper.to_columns(DataTypeDefXsd::Integer, Some("+42")).is_ok());
    }
}
