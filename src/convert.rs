//! Value conversion rules.
//!
//! Destination types describe themselves through [`FromValue::type_info`]. When a
//! deserializer is built for a result shape, every bound column gets a
//! [`Conversion`] chosen from the column's [`DbType`] and the destination's
//! [`TypeInfo`]. The row loop then only applies the precomputed rule.
//!
//! # Narrowing
//!
//! Numeric conversions never fail on overflow:
//! - integer narrowing truncates to the destination width (two's complement)
//! - float to integer truncates toward zero and saturates at the destination bounds
//! - decimal to integer drops the fraction
//! - float to decimal takes the nearest representable decimal (NaN and
//!   infinities are rejected)

use std::any::TypeId;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use uuid::Uuid;

use crate::constant::DbType;
use crate::error::{Error, Result};
use crate::handler::{ConversionRegistry, TypeHandler};
use crate::value::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// A named value of a unit enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumVariant {
    pub name: &'static str,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Scalar,
    Enum(&'static [EnumVariant]),
    /// Accepts any value as-is (`Value` itself).
    Any,
}

/// Describes how a destination type wants its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeInfo {
    pub db_type: DbType,
    /// `Option<T>` and other types with a representable "absent" value.
    pub nullable: bool,
    pub kind: TypeKind,
    /// Identity used for custom handler lookup. `Option<T>` reports `T`.
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl TypeInfo {
    pub fn of<T: 'static>(db_type: DbType) -> Self {
        Self {
            db_type,
            nullable: false,
            kind: TypeKind::Scalar,
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn enumeration<T: 'static>(variants: &'static [EnumVariant]) -> Self {
        Self {
            db_type: DbType::I64,
            nullable: false,
            kind: TypeKind::Enum(variants),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn any() -> Self {
        Self {
            db_type: DbType::Null,
            nullable: true,
            kind: TypeKind::Any,
            type_id: TypeId::of::<Value>(),
            type_name: "Value",
        }
    }

    pub fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// Trait for types that can be built from a column value.
///
/// `from_value` receives either `Value::Null` or a value already converted to
/// the representation announced by `type_info`. Implementations stay lenient
/// and coerce anything else, so they can be used outside a compiled plan.
pub trait FromValue: Sized {
    fn type_info() -> TypeInfo;

    fn from_value(value: Value) -> Result<Self>;

    /// The value used for database NULL and for members with no matching column.
    fn from_null() -> Result<Self>;
}

/// Per-column conversion chosen when a deserializer is built.
#[derive(Clone)]
pub enum Conversion {
    /// Source and destination share a representation.
    Direct,
    /// Widening or narrowing between numeric representations.
    Numeric(DbType),
    /// Integer discriminant or case-insensitive variant name.
    Enum(&'static [EnumVariant]),
    /// Text/bytes parsing (GUIDs, timestamps, decimals, UTF-8).
    Parse(DbType),
    /// Registered custom handler for the destination type.
    Handler(Arc<dyn TypeHandler>),
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conversion::Direct => f.write_str("Direct"),
            Conversion::Numeric(to) => write!(f, "Numeric({:?})", to),
            Conversion::Enum(variants) => write!(f, "Enum({} variants)", variants.len()),
            Conversion::Parse(to) => write!(f, "Parse({:?})", to),
            Conversion::Handler(_) => f.write_str("Handler"),
        }
    }
}

impl Conversion {
    /// Choose the rule for a column of type `source` bound to `dest`.
    ///
    /// Fails with `ConfigurationError` when no rule exists.
    pub fn plan(
        source: DbType,
        dest: &TypeInfo,
        registry: &dyn ConversionRegistry,
    ) -> Result<Self> {
        if matches!(dest.kind, TypeKind::Any) {
            return Ok(Conversion::Direct);
        }
        if let Some(handler) = registry.handler(dest.type_id) {
            return Ok(Conversion::Handler(handler));
        }
        if let TypeKind::Enum(variants) = dest.kind {
            return if source.is_integer() || matches!(source, DbType::Text | DbType::Null) {
                Ok(Conversion::Enum(variants))
            } else {
                Err(unmappable(source, dest))
            };
        }
        if source == dest.db_type {
            return Ok(Conversion::Direct);
        }
        // Untyped column (e.g. `SELECT NULL AS x`): coerce whatever arrives.
        if source == DbType::Null {
            return Ok(Conversion::Parse(dest.db_type));
        }
        if source.is_numeric() && dest.db_type.is_numeric() {
            return Ok(Conversion::Numeric(dest.db_type));
        }
        if can_parse(source, dest.db_type) {
            return Ok(Conversion::Parse(dest.db_type));
        }
        Err(unmappable(source, dest))
    }

    pub fn apply(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Conversion::Direct => Ok(value),
            Conversion::Numeric(to) | Conversion::Parse(to) => coerce(value, *to),
            Conversion::Enum(variants) => enum_discriminant(variants, value),
            Conversion::Handler(handler) => handler.parse(value),
        }
    }
}

fn unmappable(source: DbType, dest: &TypeInfo) -> Error {
    Error::ConfigurationError(format!(
        "cannot map a {:?} column to {} ({:?})",
        source, dest.type_name, dest.db_type
    ))
}

fn can_parse(source: DbType, to: DbType) -> bool {
    match to {
        DbType::Text => matches!(source, DbType::Bytes | DbType::Guid),
        DbType::Bytes => matches!(source, DbType::Text | DbType::Guid),
        DbType::Guid => matches!(source, DbType::Text | DbType::Bytes),
        DbType::DateTime | DbType::Decimal | DbType::Bool => source == DbType::Text,
        _ => false,
    }
}

/// Position in `variants` of the variant named by `value`, matched by
/// discriminant or case-insensitive name.
pub fn enum_index(variants: &[EnumVariant], value: &Value) -> Result<usize> {
    let found = match value {
        Value::SignedInt(v) => variants.iter().position(|variant| variant.value == *v),
        Value::UnsignedInt(v) => variants
            .iter()
            .position(|variant| u64::try_from(variant.value).is_ok_and(|d| d == *v)),
        Value::Text(name) => variants
            .iter()
            .position(|variant| variant.name.eq_ignore_ascii_case(name.trim())),
        _ => None,
    };
    found.ok_or_else(|| Error::Conversion(format!("{} does not name an enum variant", value)))
}

/// The variant used for NULL: discriminant zero, else the first variant.
pub fn enum_default_index(variants: &[EnumVariant]) -> usize {
    variants
        .iter()
        .position(|variant| variant.value == 0)
        .unwrap_or(0)
}

fn enum_discriminant(variants: &[EnumVariant], value: Value) -> Result<Value> {
    let index = enum_index(variants, &value)?;
    Ok(Value::SignedInt(variants[index].value))
}

/// Whole-number view of a numeric value, following the narrowing rules above.
fn integral(value: &Value) -> Option<i128> {
    match value {
        Value::Bool(v) => Some(i128::from(*v)),
        Value::SignedInt(v) => Some(i128::from(*v)),
        Value::UnsignedInt(v) => Some(i128::from(*v)),
        Value::Decimal(v) => v.trunc().to_i128(),
        _ => None,
    }
}

fn double(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        Value::SignedInt(v) => Some(*v as f64),
        Value::UnsignedInt(v) => Some(*v as f64),
        Value::Float(v) => Some(f64::from(*v)),
        Value::Double(v) => Some(*v),
        Value::Decimal(v) => v.to_f64(),
        _ => None,
    }
}

// `as` from a float truncates toward zero and saturates at the target bounds.
fn float_to_signed(v: f64, to: DbType) -> i64 {
    match to {
        DbType::I8 => i64::from(v as i8),
        DbType::I16 => i64::from(v as i16),
        DbType::I32 => i64::from(v as i32),
        _ => v as i64,
    }
}

fn float_to_unsigned(v: f64, to: DbType) -> u64 {
    match to {
        DbType::U8 => u64::from(v as u8),
        DbType::U16 => u64::from(v as u16),
        DbType::U32 => u64::from(v as u32),
        _ => v as u64,
    }
}

fn truncate_signed(v: i128, to: DbType) -> i64 {
    match to {
        DbType::I8 => i64::from(v as i8),
        DbType::I16 => i64::from(v as i16),
        DbType::I32 => i64::from(v as i32),
        _ => v as i64,
    }
}

fn truncate_unsigned(v: i128, to: DbType) -> u64 {
    match to {
        DbType::U8 => u64::from(v as u8),
        DbType::U16 => u64::from(v as u16),
        DbType::U32 => u64::from(v as u32),
        _ => v as u64,
    }
}

fn mismatch(value: &Value, to: DbType) -> Error {
    Error::Conversion(format!("cannot convert {} value {} to {:?}", value.kind(), value, to))
}

/// Convert `value` to the canonical variant for `to`.
///
/// Signed destinations yield `SignedInt`, unsigned ones `UnsignedInt`, `F32`
/// yields `Float`, and so on. `Null` passes through untouched.
pub fn coerce(value: Value, to: DbType) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match to {
        DbType::Null => Ok(value),
        DbType::Bool => match &value {
            Value::Bool(v) => Ok(Value::Bool(*v)),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => integral(other)
                .map(|v| Value::Bool(v != 0))
                .ok_or_else(|| mismatch(other, to)),
        },
        DbType::I8 | DbType::I16 | DbType::I32 | DbType::I64 => match &value {
            Value::SignedInt(v) if to == DbType::I64 => Ok(Value::SignedInt(*v)),
            Value::Float(v) => Ok(Value::SignedInt(float_to_signed(f64::from(*v), to))),
            Value::Double(v) => Ok(Value::SignedInt(float_to_signed(*v, to))),
            other => integral(other)
                .map(|v| Value::SignedInt(truncate_signed(v, to)))
                .ok_or_else(|| mismatch(other, to)),
        },
        DbType::U8 | DbType::U16 | DbType::U32 | DbType::U64 => match &value {
            Value::UnsignedInt(v) if to == DbType::U64 => Ok(Value::UnsignedInt(*v)),
            Value::Float(v) => Ok(Value::UnsignedInt(float_to_unsigned(f64::from(*v), to))),
            Value::Double(v) => Ok(Value::UnsignedInt(float_to_unsigned(*v, to))),
            other => integral(other)
                .map(|v| Value::UnsignedInt(truncate_unsigned(v, to)))
                .ok_or_else(|| mismatch(other, to)),
        },
        DbType::F32 => match &value {
            Value::Float(v) => Ok(Value::Float(*v)),
            other => double(other)
                .map(|v| Value::Float(v as f32))
                .ok_or_else(|| mismatch(other, to)),
        },
        DbType::F64 => match &value {
            Value::Double(v) => Ok(Value::Double(*v)),
            other => double(other)
                .map(Value::Double)
                .ok_or_else(|| mismatch(other, to)),
        },
        DbType::Decimal => match value {
            Value::Decimal(_) => Ok(value),
            Value::Bool(v) => Ok(Value::Decimal(Decimal::from(u8::from(v)))),
            Value::SignedInt(v) => Ok(Value::Decimal(Decimal::from(v))),
            Value::UnsignedInt(v) => Ok(Value::Decimal(Decimal::from(v))),
            Value::Float(v) => Decimal::from_f32(v)
                .map(Value::Decimal)
                .ok_or_else(|| mismatch(&Value::Float(v), to)),
            Value::Double(v) => Decimal::from_f64(v)
                .map(Value::Decimal)
                .ok_or_else(|| mismatch(&Value::Double(v), to)),
            Value::Text(s) => Decimal::from_str(s.trim())
                .map(Value::Decimal)
                .map_err(|e| Error::Conversion(format!("invalid decimal '{}': {}", s, e))),
            other => Err(mismatch(&other, to)),
        },
        DbType::Text => match value {
            Value::Text(_) => Ok(value),
            Value::Bytes(bytes) => Ok(Value::Text(simdutf8::basic::from_utf8(&bytes)?.to_owned())),
            Value::Guid(v) => Ok(Value::Text(v.to_string())),
            other => Err(mismatch(&other, to)),
        },
        DbType::Bytes => match value {
            Value::Bytes(_) => Ok(value),
            Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            Value::Guid(v) => Ok(Value::Bytes(v.as_bytes().to_vec())),
            other => Err(mismatch(&other, to)),
        },
        DbType::Guid => match value {
            Value::Guid(_) => Ok(value),
            Value::Text(s) => Uuid::parse_str(s.trim())
                .map(Value::Guid)
                .map_err(|e| Error::Conversion(format!("invalid guid '{}': {}", s, e))),
            Value::Bytes(bytes) => Uuid::from_slice(&bytes)
                .map(Value::Guid)
                .map_err(|e| Error::Conversion(format!("invalid guid bytes: {}", e))),
            other => Err(mismatch(&other, to)),
        },
        DbType::DateTime => match value {
            Value::DateTime(_) => Ok(value),
            Value::Text(s) => parse_datetime(&s).map(Value::DateTime),
            other => Err(mismatch(&other, to)),
        },
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    let trimmed = s.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| Error::Conversion(format!("invalid datetime '{}'", s)))
}

/// Coerce `value` to `T`'s representation, then build a `T`.
pub fn value_as<T: FromValue>(value: Value) -> Result<T> {
    let info = T::type_info();
    let value = match info.kind {
        TypeKind::Any => value,
        TypeKind::Enum(variants) if !value.is_null() => enum_discriminant(variants, value)?,
        _ => coerce(value, info.db_type)?,
    };
    T::from_value(value)
}

// ============================================================================
// FromValue implementations
// ============================================================================

macro_rules! impl_from_value_signed {
    ($($t:ty => $db:ident),+ $(,)?) => {
        $(
            impl FromValue for $t {
                fn type_info() -> TypeInfo {
                    TypeInfo::of::<$t>(DbType::$db)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::SignedInt(v) => Ok(v as $t),
                        Value::Null => Self::from_null(),
                        other => Self::from_value(coerce(other, DbType::$db)?),
                    }
                }

                fn from_null() -> Result<Self> {
                    Ok(0)
                }
            }
        )+
    };
}

macro_rules! impl_from_value_unsigned {
    ($($t:ty => $db:ident),+ $(,)?) => {
        $(
            impl FromValue for $t {
                fn type_info() -> TypeInfo {
                    TypeInfo::of::<$t>(DbType::$db)
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::UnsignedInt(v) => Ok(v as $t),
                        Value::Null => Self::from_null(),
                        other => Self::from_value(coerce(other, DbType::$db)?),
                    }
                }

                fn from_null() -> Result<Self> {
                    Ok(0)
                }
            }
        )+
    };
}

impl_from_value_signed!(i8 => I8, i16 => I16, i32 => I32, i64 => I64);
impl_from_value_unsigned!(u8 => U8, u16 => U16, u32 => U32, u64 => U64);

impl FromValue for bool {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<bool>(DbType::Bool)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::Bool)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(false)
    }
}

impl FromValue for f32 {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<f32>(DbType::F32)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::F32)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(0.0)
    }
}

impl FromValue for f64 {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<f64>(DbType::F64)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::F64)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(0.0)
    }
}

impl FromValue for Decimal {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<Decimal>(DbType::Decimal)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Decimal(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::Decimal)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(Decimal::ZERO)
    }
}

impl FromValue for String {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<String>(DbType::Text)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::Text)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(String::new())
    }
}

impl FromValue for Vec<u8> {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<Vec<u8>>(DbType::Bytes)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::Bytes)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(Vec::new())
    }
}

impl FromValue for NaiveDateTime {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<NaiveDateTime>(DbType::DateTime)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::DateTime)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(NaiveDateTime::default())
    }
}

impl FromValue for Uuid {
    fn type_info() -> TypeInfo {
        TypeInfo::of::<Uuid>(DbType::Guid)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Guid(v) => Ok(v),
            Value::Null => Self::from_null(),
            other => Self::from_value(coerce(other, DbType::Guid)?),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(Uuid::nil())
    }
}

impl FromValue for Value {
    fn type_info() -> TypeInfo {
        TypeInfo::any()
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }

    fn from_null() -> Result<Self> {
        Ok(Value::Null)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn type_info() -> TypeInfo {
        T::type_info().nullable()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_null() -> Result<Self> {
        Ok(None)
    }
}
