//! The data-source side of the mapper.
//!
//! A cursor is a single-consumer handle over one or more result sets. The
//! mapper never performs I/O itself: advancing rows and result sets is the
//! collaborator's job, either synchronously ([`Cursor`]) or awaited
//! ([`AsyncCursor`]).

use std::future::Future;
use std::sync::Arc;

use auto_impl::auto_impl;

use crate::constant::DbType;
use crate::error::{Error, Result};
use crate::value::Value;

/// Column metadata and value access for the current row.
#[auto_impl(&, &mut, Box, Arc)]
pub trait Record {
    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> &str;

    fn column_type(&self, index: usize) -> DbType;

    /// Value of column `index` in the current row.
    fn value(&self, index: usize) -> Result<Value>;
}

/// A blocking cursor.
#[auto_impl(&mut, Box)]
pub trait Cursor: Record {
    /// Move to the next row of the current result set.
    fn advance_row(&mut self) -> Result<bool>;

    /// Move to the next result set. Returns `false` when there is none.
    fn advance_result_set(&mut self) -> Result<bool>;
}

/// A cursor whose advance operations are awaited.
pub trait AsyncCursor: Record + Send {
    fn advance_row(&mut self) -> impl Future<Output = Result<bool>> + Send;

    fn advance_result_set(&mut self) -> impl Future<Output = Result<bool>> + Send;
}

/// Column definition of an in-memory result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub db_type: DbType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
        }
    }
}

/// One buffered result set.
#[derive(Debug, Clone, Default)]
pub struct VecResultSet {
    columns: Arc<[ColumnInfo]>,
    rows: Vec<Vec<Value>>,
}

impl VecResultSet {
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, DbType)>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, db_type)| ColumnInfo::new(name, db_type))
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_columns(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns: columns.into(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Fails if the arity does not match the columns.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidInput(format!(
                "row has {} values, result set has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn row(mut self, row: Vec<Value>) -> Result<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An in-memory cursor over buffered result sets.
///
/// Starts positioned on the first result set, before its first row.
#[derive(Debug, Clone, Default)]
pub struct VecCursor {
    sets: Vec<VecResultSet>,
    set: usize,
    row: Option<usize>,
}

impl VecCursor {
    pub fn new(sets: Vec<VecResultSet>) -> Self {
        Self {
            sets,
            set: 0,
            row: None,
        }
    }

    fn current_set(&self) -> Option<&VecResultSet> {
        self.sets.get(self.set)
    }

    fn column(&self, index: usize) -> Option<&ColumnInfo> {
        self.current_set().and_then(|set| set.columns.get(index))
    }

    fn step_row(&mut self) -> bool {
        let Some(len) = self.current_set().map(VecResultSet::len) else {
            return false;
        };
        let next = self.row.map_or(0, |row| row + 1);
        if next < len {
            self.row = Some(next);
            true
        } else {
            self.row = Some(len);
            false
        }
    }

    fn step_result_set(&mut self) -> bool {
        if self.set < self.sets.len() {
            self.set += 1;
        }
        self.row = None;
        self.set < self.sets.len()
    }
}

impl Record for VecCursor {
    fn column_count(&self) -> usize {
        self.current_set().map_or(0, |set| set.columns.len())
    }

    fn column_name(&self, index: usize) -> &str {
        self.column(index).map_or("", |col| col.name.as_str())
    }

    fn column_type(&self, index: usize) -> DbType {
        self.column(index).map_or(DbType::Null, |col| col.db_type)
    }

    fn value(&self, index: usize) -> Result<Value> {
        let set = self
            .current_set()
            .ok_or_else(|| Error::InvalidInput("cursor has no current result set".into()))?;
        let row = self
            .row
            .and_then(|row| set.rows.get(row))
            .ok_or_else(|| Error::InvalidInput("cursor has no current row".into()))?;
        row.get(index).cloned().ok_or_else(|| {
            Error::InvalidInput(format!(
                "column index {} out of range ({} columns)",
                index,
                row.len()
            ))
        })
    }
}

impl Cursor for VecCursor {
    fn advance_row(&mut self) -> Result<bool> {
        Ok(self.step_row())
    }

    fn advance_result_set(&mut self) -> Result<bool> {
        Ok(self.step_result_set())
    }
}

impl AsyncCursor for VecCursor {
    fn advance_row(&mut self) -> impl Future<Output = Result<bool>> + Send {
        std::future::ready(Ok(self.step_row()))
    }

    fn advance_result_set(&mut self) -> impl Future<Output = Result<bool>> + Send {
        std::future::ready(Ok(self.step_result_set()))
    }
}
