//! Materialization builder.
//!
//! Binds a [`TypeMap`] to one concrete column shape and returns a row
//! function. All name matching and conversion planning happens here, once per
//! shape; the returned closure only reads values and applies the planned
//! conversions.

use std::sync::Arc;

use tracing::trace;

use crate::convert::{Conversion, TypeInfo};
use crate::cursor::Record;
use crate::error::{Error, Result};
use crate::handler::ConversionRegistry;
use crate::row::{Row, RowSchema};
use crate::type_map::{Args, Constructor, FromRow, Member, Named, TypeMap};
use crate::value::Value;

/// A compiled per-shape deserializer. `Ok(None)` means "no object" for the row.
pub type RowFn<T> = Arc<dyn Fn(&dyn Record) -> Result<Option<T>> + Send + Sync>;

/// A column bound to a destination slot.
#[derive(Debug, Clone)]
struct Binding {
    column: usize,
    name: String,
    conversion: Conversion,
}

impl Binding {
    fn plan(
        record: &dyn Record,
        column: usize,
        dest: &TypeInfo,
        registry: &dyn ConversionRegistry,
    ) -> Result<Self> {
        let name = record.column_name(column).to_owned();
        let conversion = Conversion::plan(record.column_type(column), dest, registry)
            .map_err(|e| in_column(e, &name))?;
        Ok(Self {
            column,
            name,
            conversion,
        })
    }

    fn read(&self, record: &dyn Record) -> Result<Value> {
        let value = record.value(self.column)?;
        self.conversion
            .apply(value)
            .map_err(|e| in_column(e, &self.name))
    }
}

fn in_column(err: Error, column: &str) -> Error {
    match err {
        Error::Conversion(msg) => Error::Conversion(format!("column '{}': {}", column, msg)),
        Error::ConfigurationError(msg) => {
            Error::ConfigurationError(format!("column '{}': {}", column, msg))
        }
        other => other,
    }
}

fn first_is_null(record: &dyn Record, start: usize, length: usize) -> Result<bool> {
    if length == 0 {
        return Ok(false);
    }
    Ok(record.value(start)?.is_null())
}

/// Build the deserializer of `T` for columns `start..start + length`.
///
/// With `first_missing` set, a null first column maps the row to `None` unless
/// `T` itself can represent an absent value.
pub fn build<T: FromRow>(
    record: &dyn Record,
    start: usize,
    length: usize,
    first_missing: bool,
    registry: &dyn ConversionRegistry,
) -> Result<RowFn<T>> {
    match T::type_map() {
        TypeMap::Scalar { info, build } => {
            scalar(record, start, length, first_missing, registry, info, build)
        }
        TypeMap::Positional { fields, build } => {
            positional(record, start, length, first_missing, registry, &fields, build)
        }
        TypeMap::Named(named) => composite(record, start, length, first_missing, registry, named),
        TypeMap::Dynamic { build } => Ok(dynamic(record, start, length, first_missing, build)),
    }
}

fn scalar<T: FromRow>(
    record: &dyn Record,
    start: usize,
    length: usize,
    first_missing: bool,
    registry: &dyn ConversionRegistry,
    info: TypeInfo,
    build: fn(Value) -> Result<T>,
) -> Result<RowFn<T>> {
    if length == 0 {
        return Err(Error::ConfigurationError(format!(
            "{} needs at least one column",
            info.type_name
        )));
    }
    let binding = Binding::plan(record, start, &info, registry)?;
    let absent_is_none = first_missing && !info.nullable;
    Ok(Arc::new(move |record: &dyn Record| {
        let value = binding.read(record)?;
        if absent_is_none && value.is_null() {
            return Ok(None);
        }
        build(value).map(Some).map_err(|e| in_column(e, &binding.name))
    }))
}

fn positional<T: FromRow>(
    record: &dyn Record,
    start: usize,
    length: usize,
    first_missing: bool,
    registry: &dyn ConversionRegistry,
    fields: &[TypeInfo],
    build: fn(&mut Args) -> Result<T>,
) -> Result<RowFn<T>> {
    let bindings = fields
        .iter()
        .zip(start..start + length)
        .map(|(info, column)| Binding::plan(record, column, info, registry))
        .collect::<Result<Vec<_>>>()?;
    let arity = fields.len();
    Ok(Arc::new(move |record: &dyn Record| {
        if first_missing && first_is_null(record, start, length)? {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(arity);
        for binding in &bindings {
            values.push(binding.read(record)?);
        }
        build(&mut Args::new(values)).map(Some)
    }))
}

/// Index of the column named `name`: exact match first, then case-insensitive.
fn find_column(columns: &[(usize, String)], taken: &[bool], name: &str) -> Option<usize> {
    let free = |pos: &usize| !taken[*pos];
    (0..columns.len())
        .filter(free)
        .find(|pos| columns[*pos].1 == name)
        .or_else(|| {
            (0..columns.len())
                .filter(free)
                .find(|pos| columns[*pos].1.eq_ignore_ascii_case(name))
        })
}

/// Pick the constructor with the most parameters that all match a column.
fn choose_constructor<'a, T>(
    constructors: &'a [Constructor<T>],
    columns: &[(usize, String)],
) -> Option<(&'a Constructor<T>, Vec<usize>)> {
    let mut best: Option<(&Constructor<T>, Vec<usize>)> = None;
    for ctor in constructors {
        let mut taken = vec![false; columns.len()];
        let mut positions = Vec::with_capacity(ctor.params.len());
        for param in &ctor.params {
            let Some(pos) = find_column(columns, &taken, param.name) else {
                break;
            };
            taken[pos] = true;
            positions.push(pos);
        }
        let complete = positions.len() == ctor.params.len();
        let better = best
            .as_ref()
            .is_none_or(|(chosen, _)| ctor.params.len() > chosen.params.len());
        if complete && better {
            best = Some((ctor, positions));
        }
    }
    best
}

enum Init<T> {
    Constructor {
        build: fn(&mut Args) -> Result<T>,
        args: Vec<Binding>,
    },
    Default(fn() -> Result<T>),
}

fn composite<T: FromRow>(
    record: &dyn Record,
    start: usize,
    length: usize,
    first_missing: bool,
    registry: &dyn ConversionRegistry,
    named: Named<T>,
) -> Result<RowFn<T>> {
    let columns = (start..start + length)
        .map(|i| (i, record.column_name(i).to_owned()))
        .collect::<Vec<_>>();
    let mut taken = vec![false; columns.len()];

    let init = match choose_constructor(&named.constructors, &columns) {
        Some((ctor, positions)) => {
            let mut args = Vec::with_capacity(positions.len());
            for (param, pos) in ctor.params.iter().zip(positions) {
                taken[pos] = true;
                args.push(Binding::plan(record, columns[pos].0, &param.info, registry)?);
            }
            Init::Constructor {
                build: ctor.build,
                args,
            }
        }
        None => match named.default {
            Some(build) => Init::Default(build),
            None => {
                return Err(Error::ConfigurationError(format!(
                    "{}: no constructor matches the columns [{}] and there is no default constructor",
                    std::any::type_name::<T>(),
                    columns
                        .iter()
                        .map(|(_, name)| name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
        },
    };

    let mut members: Vec<(Binding, fn(&mut T, Value) -> Result<()>)> = Vec::new();
    let mut assigned = vec![false; named.members.len()];
    for (pos, (column, name)) in columns.iter().enumerate() {
        if taken[pos] {
            continue;
        }
        let Some(index) = find_member(&named.members, &assigned, name) else {
            trace!(column = %name, "no member for column");
            continue;
        };
        assigned[index] = true;
        let member = &named.members[index];
        members.push((Binding::plan(record, *column, &member.info, registry)?, member.set));
    }

    Ok(Arc::new(move |record: &dyn Record| {
        if first_missing && first_is_null(record, start, length)? {
            return Ok(None);
        }
        let mut object = match &init {
            Init::Constructor { build, args } => {
                let mut values = Vec::with_capacity(args.len());
                for binding in args {
                    values.push(binding.read(record)?);
                }
                build(&mut Args::new(values))?
            }
            Init::Default(build) => build()?,
        };
        for (binding, set) in &members {
            let value = binding.read(record)?;
            set(&mut object, value).map_err(|e| in_column(e, &binding.name))?;
        }
        Ok(Some(object))
    }))
}

fn find_member<T>(members: &[Member<T>], assigned: &[bool], column: &str) -> Option<usize> {
    members
        .iter()
        .enumerate()
        .position(|(i, member)| !assigned[i] && member.name == column)
        .or_else(|| {
            members
                .iter()
                .enumerate()
                .position(|(i, member)| !assigned[i] && member.name.eq_ignore_ascii_case(column))
        })
}

fn dynamic<T: FromRow>(
    record: &dyn Record,
    start: usize,
    length: usize,
    first_missing: bool,
    build: fn(Row) -> Result<T>,
) -> RowFn<T> {
    let schema = Arc::new(RowSchema::new(
        (start..start + length).map(|i| record.column_name(i).to_owned()),
    ));
    Arc::new(move |record: &dyn Record| {
        let mut values = Vec::with_capacity(length);
        for i in start..start + length {
            values.push(record.value(i)?);
        }
        if first_missing && values.first().is_some_and(Value::is_null) {
            return Ok(None);
        }
        build(Row::from_values(Arc::clone(&schema), values)).map(Some)
    })
}
