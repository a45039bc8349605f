//! Column-shape identity.
//!
//! A shape is the ordered `(name, type)` sequence of a column range. The
//! signature is a fast filter; [`Shape::matches`] is the authoritative check.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::constant::DbType;
use crate::cursor::Record;
use crate::error::{Error, Result};

/// A contiguous column range. `length: None` means "to the last column".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColumnRange {
    pub start: usize,
    pub length: Option<usize>,
}

impl ColumnRange {
    /// Every column.
    pub const fn all() -> Self {
        Self {
            start: 0,
            length: None,
        }
    }

    pub const fn new(start: usize, length: usize) -> Self {
        Self {
            start,
            length: Some(length),
        }
    }

    /// From `start` to the last column.
    pub const fn starting_at(start: usize) -> Self {
        Self {
            start,
            length: None,
        }
    }

    /// Resolve against `record` into a concrete `(start, length)`.
    pub fn resolve(self, record: &dyn Record) -> Result<(usize, usize)> {
        let count = record.column_count();
        if self.start > count {
            return Err(Error::InvalidInput(format!(
                "column range starts at {} but the result has {} columns",
                self.start, count
            )));
        }
        let length = match self.length {
            Some(length) => length,
            None => count - self.start,
        };
        if self.start.checked_add(length).is_none_or(|end| end > count) {
            return Err(Error::InvalidInput(format!(
                "column range of {} columns from {} exceeds the {} result columns",
                length, self.start, count
            )));
        }
        Ok((self.start, length))
    }
}

/// Signature of columns `start..start + length`, salted by `salt`.
///
/// `length` must already be resolved. Values are never read.
pub fn signature(record: &dyn Record, start: usize, length: usize, salt: bool) -> u64 {
    let mut hasher = DefaultHasher::new();
    salt.hash(&mut hasher);
    start.hash(&mut hasher);
    length.hash(&mut hasher);
    for i in start..start + length {
        record.column_name(i).hash(&mut hasher);
        (record.column_type(i) as u8).hash(&mut hasher);
    }
    hasher.finish()
}

/// A captured shape, kept next to each cache entry for the equality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    columns: Vec<(String, DbType)>,
}

impl Shape {
    pub fn capture(record: &dyn Record, start: usize, length: usize) -> Self {
        Self {
            columns: (start..start + length)
                .map(|i| (record.column_name(i).to_owned(), record.column_type(i)))
                .collect(),
        }
    }

    /// Name-by-name, type-by-type comparison against `record`.
    pub fn matches(&self, record: &dyn Record, start: usize, length: usize) -> bool {
        self.columns.len() == length
            && self
                .columns
                .iter()
                .zip(start..start + length)
                .all(|((name, db_type), i)| {
                    *db_type == record.column_type(i) && name.as_str() == record.column_name(i)
                })
    }

    pub fn columns(&self) -> &[(String, DbType)] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
