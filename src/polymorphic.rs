//! Per-row subtype dispatch.
//!
//! A [`PolymorphicLoader`] reads a discriminator column and materializes each
//! row as the concrete type it selects, converting into a common base type.
//! Each concrete type is cached under its own key, so rows of one query may
//! switch types freely without rebuilding.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::cache::{DeserializerCache, GLOBAL_CACHE};
use crate::cursor::Record;
use crate::error::{Error, Result};
use crate::shape::ColumnRange;
use crate::type_map::FromRow;
use crate::value::Value;

type LoadFn<B> = fn(&DeserializerCache, &dyn Record, ColumnRange, bool) -> Result<Option<B>>;

/// A concrete type that loads into base type `B`.
pub struct Subtype<B> {
    type_id: TypeId,
    name: &'static str,
    load: LoadFn<B>,
}

impl<B> Clone for Subtype<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for Subtype<B> {}

impl<B> fmt::Debug for Subtype<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl<B> Subtype<B> {
    pub fn of<T>() -> Self
    where
        T: FromRow + Into<B>,
    {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            load: |cache, record, range, first_missing| {
                let deserializer = cache.get_or_build::<T>(record, range, first_missing)?;
                Ok(deserializer.deserialize(record)?.map(Into::into))
            },
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

type Resolve<B> = dyn Fn(&Value) -> Option<Subtype<B>> + Send + Sync;

/// Loads rows as one of several subtypes of `B`, selected by a discriminator.
pub struct PolymorphicLoader<B> {
    discriminator: String,
    resolve: Arc<Resolve<B>>,
    cache: Arc<DeserializerCache>,
}

impl<B> Clone for PolymorphicLoader<B> {
    fn clone(&self) -> Self {
        Self {
            discriminator: self.discriminator.clone(),
            resolve: Arc::clone(&self.resolve),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<B: 'static> PolymorphicLoader<B> {
    /// `resolve` maps a non-null discriminator value to a subtype.
    pub fn new<F>(discriminator: impl Into<String>, resolve: F) -> Self
    where
        F: Fn(&Value) -> Option<Subtype<B>> + Send + Sync + 'static,
    {
        Self {
            discriminator: discriminator.into(),
            resolve: Arc::new(resolve),
            cache: Arc::clone(&GLOBAL_CACHE),
        }
    }

    pub fn with_cache(mut self, cache: Arc<DeserializerCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Bind the loader to `range` of `record`'s columns.
    ///
    /// Fails with `ConfigurationError` when the discriminator column is not
    /// inside the range.
    pub fn get_deserializer(
        &self,
        record: &dyn Record,
        range: ColumnRange,
        first_missing: bool,
    ) -> Result<PolymorphicDeserializer<B>> {
        let (start, length) = range.resolve(record)?;
        let column = (start..start + length)
            .find(|i| record.column_name(*i) == self.discriminator)
            .or_else(|| {
                (start..start + length)
                    .find(|i| record.column_name(*i).eq_ignore_ascii_case(&self.discriminator))
            })
            .ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "discriminator column not found: {}",
                    self.discriminator
                ))
            })?;
        Ok(PolymorphicDeserializer {
            loader: self.clone(),
            column,
            range: ColumnRange::new(start, length),
            first_missing,
        })
    }
}

/// A [`PolymorphicLoader`] bound to one column layout.
pub struct PolymorphicDeserializer<B> {
    loader: PolymorphicLoader<B>,
    column: usize,
    range: ColumnRange,
    first_missing: bool,
}

impl<B: 'static> PolymorphicDeserializer<B> {
    /// Index of the discriminator column.
    pub fn column(&self) -> usize {
        self.column
    }

    /// Materialize the current row. A null discriminator yields `None`.
    pub fn deserialize(&self, record: &dyn Record) -> Result<Option<B>> {
        let value = record.value(self.column)?;
        if value.is_null() {
            return Ok(None);
        }
        let subtype = (self.loader.resolve)(&value).ok_or_else(|| {
            Error::ConfigurationError(format!(
                "no subtype for {} = {}",
                self.loader.discriminator, value
            ))
        })?;
        (subtype.load)(
            self.loader.cache.as_ref(),
            record,
            self.range,
            self.first_missing,
        )
    }
}
