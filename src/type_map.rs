//! How a destination type is laid out for materialization.
//!
//! A type describes itself once through [`FromRow::type_map`]. The builder in
//! [`crate::materialize`] binds that description to a concrete column shape.

use std::mem;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::convert::{FromValue, TypeInfo};
use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// Types that can be materialized from a row.
///
/// Implement with `#[derive(FromRow)]` for named-field structs. Scalars,
/// tuples up to eight elements and [`Row`] are provided.
pub trait FromRow: Sized + Send + 'static {
    fn type_map() -> TypeMap<Self>;
}

pub enum TypeMap<T> {
    /// Built from the first column of the range.
    Scalar {
        info: TypeInfo,
        build: fn(Value) -> Result<T>,
    },
    /// Field `i` is built from column `start + i`.
    Positional {
        fields: Vec<TypeInfo>,
        build: fn(&mut Args) -> Result<T>,
    },
    /// Columns are matched to constructor parameters and members by name.
    Named(Named<T>),
    /// A [`Row`] sharing one schema per shape.
    Dynamic { build: fn(Row) -> Result<T> },
}

/// Named members and constructors of a composite type.
pub struct Named<T> {
    pub constructors: Vec<Constructor<T>>,
    /// The parameterless constructor, used when no constructor in
    /// `constructors` receives a full parameter set.
    pub default: Option<fn() -> Result<T>>,
    pub members: Vec<Member<T>>,
}

impl<T> Named<T> {
    pub fn new() -> Self {
        Self {
            constructors: Vec::new(),
            default: None,
            members: Vec::new(),
        }
    }

    pub fn default_constructor(mut self, build: fn() -> Result<T>) -> Self {
        self.default = Some(build);
        self
    }

    pub fn constructor(mut self, constructor: Constructor<T>) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn member(mut self, member: Member<T>) -> Self {
        self.members.push(member);
        self
    }
}

impl<T> Default for Named<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Named<T>> for TypeMap<T> {
    fn from(named: Named<T>) -> Self {
        TypeMap::Named(named)
    }
}

/// A settable field or property.
pub struct Member<T> {
    pub name: &'static str,
    pub info: TypeInfo,
    /// Receives the converted value, or `Value::Null`.
    pub set: fn(&mut T, Value) -> Result<()>,
}

impl<T> Member<T> {
    pub fn new<V: FromValue>(name: &'static str, set: fn(&mut T, Value) -> Result<()>) -> Self {
        Self {
            name,
            info: V::type_info(),
            set,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub info: TypeInfo,
}

impl Param {
    pub fn of<V: FromValue>(name: &'static str) -> Self {
        Self {
            name,
            info: V::type_info(),
        }
    }
}

/// A constructor taking named parameters. `build` receives the arguments in
/// `params` order.
pub struct Constructor<T> {
    pub params: Vec<Param>,
    pub build: fn(&mut Args) -> Result<T>,
}

impl<T> Constructor<T> {
    pub fn new(params: Vec<Param>, build: fn(&mut Args) -> Result<T>) -> Self {
        Self { params, build }
    }
}

/// Converted argument values handed to a constructor.
#[derive(Debug, Default)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Take argument `index`. Missing arguments read as null.
    pub fn take<V: FromValue>(&mut self, index: usize) -> Result<V> {
        let value = self
            .values
            .get_mut(index)
            .map_or(Value::Null, |slot| mem::replace(slot, Value::Null));
        V::from_value(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

macro_rules! impl_scalar_from_row {
    ($($t:ty),+ $(,)?) => {
        $(
            impl FromRow for $t {
                fn type_map() -> TypeMap<Self> {
                    TypeMap::Scalar {
                        info: <$t as FromValue>::type_info(),
                        build: <$t as FromValue>::from_value,
                    }
                }
            }
        )+
    };
}

impl_scalar_from_row!(
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    bool,
    f32,
    f64,
    Decimal,
    String,
    Vec<u8>,
    NaiveDateTime,
    Uuid,
    Value,
);

impl<T: FromValue + Send + 'static> FromRow for Option<T> {
    fn type_map() -> TypeMap<Self> {
        TypeMap::Scalar {
            info: <Self as FromValue>::type_info(),
            build: <Self as FromValue>::from_value,
        }
    }
}

impl FromRow for Row {
    fn type_map() -> TypeMap<Self> {
        TypeMap::Dynamic { build: Ok }
    }
}

macro_rules! impl_tuple_from_row {
    ($($name:ident => $idx:tt),+) => {
        impl<$($name: FromValue + Send + 'static),+> FromRow for ($($name,)+) {
            fn type_map() -> TypeMap<Self> {
                TypeMap::Positional {
                    fields: vec![$($name::type_info()),+],
                    build: |args| Ok(($(args.take::<$name>($idx)?,)+)),
                }
            }
        }
    };
}

impl_tuple_from_row!(A => 0);
impl_tuple_from_row!(A => 0, B => 1);
impl_tuple_from_row!(A => 0, B => 1, C => 2);
impl_tuple_from_row!(A => 0, B => 1, C => 2, D => 3);
impl_tuple_from_row!(A => 0, B => 1, C => 2, D => 3, E => 4);
impl_tuple_from_row!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_tuple_from_row!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_tuple_from_row!(A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);
