//! Dynamic rows.
//!
//! Every row of one materialized result shares a single [`RowSchema`]. A row
//! stores its values sparsely: a column that was never written has no entry,
//! which is different from a column explicitly set to `Value::Null`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::convert::{FromValue, value_as};
use crate::error::{Error, Result};
use crate::value::Value;

#[derive(Debug, Default)]
struct SchemaInner {
    names: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
}

impl SchemaInner {
    fn push(&mut self, name: Arc<str>) -> usize {
        let index = self.names.len();
        self.names.push(Arc::clone(&name));
        self.index.entry(name).or_insert(index);
        index
    }
}

/// An append-only column catalog shared by rows.
///
/// Duplicate names are kept in the name sequence but lookups resolve to the
/// first occurrence. An index, once assigned, never changes.
#[derive(Debug, Default)]
pub struct RowSchema {
    inner: RwLock<SchemaInner>,
}

impl RowSchema {
    /// An empty schema is legal and describes zero-column rows.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = SchemaInner::default();
        for name in names {
            inner.push(Arc::from(name.as_ref()));
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .index
            .get(name)
            .copied()
    }

    /// Append `name` and return its index.
    pub fn add_column(&self, name: &str) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.index.contains_key(name) {
            return Err(Error::DuplicateColumn(name.to_owned()));
        }
        Ok(inner.push(Arc::from(name)))
    }

    // Lookup and append under one write lock, for rows gaining members.
    fn index_or_add(&self, name: &str) -> usize {
        if let Some(index) = self.index_of(name) {
            return index;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match inner.index.get(name) {
            Some(index) => *index,
            None => inner.push(Arc::from(name)),
        }
    }

    pub fn name(&self, index: usize) -> Option<Arc<str>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(index)
            .cloned()
    }

    /// Snapshot of the column names, in index order.
    pub fn names(&self) -> Vec<Arc<str>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One dynamically typed result row.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<RowSchema>,
    values: Vec<Option<Value>>,
}

impl Row {
    /// A row with every column unset.
    pub fn new(schema: Arc<RowSchema>) -> Self {
        Self {
            schema,
            values: Vec::new(),
        }
    }

    /// A row with the first `values.len()` columns set.
    pub fn from_values(schema: Arc<RowSchema>, values: Vec<Value>) -> Self {
        Self {
            schema,
            values: values.into_iter().map(Some).collect(),
        }
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    /// `None` when the column is unset, `Some(&Value::Null)` when set to null.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|index| self.get(index))
    }

    /// Read a member converted to `T`. Unset and unknown members read as `T`'s null.
    pub fn get_as<T: FromValue>(&self, name: &str) -> Result<T> {
        match self.get_by_name(name) {
            Some(value) => value_as(value.clone()),
            None => T::from_null(),
        }
    }

    /// Set the value of an existing column.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let len = self.schema.len();
        if index >= len {
            return Err(Error::InvalidInput(format!(
                "column index {} out of range ({} columns)",
                index, len
            )));
        }
        self.put(index, value.into());
        Ok(())
    }

    /// Set a member by name, appending it to the shared schema when unknown.
    ///
    /// Returns the column index.
    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> usize {
        let index = self.schema.index_or_add(name);
        self.put(index, value.into());
        index
    }

    fn put(&mut self, index: usize, value: Value) {
        if index >= self.values.len() {
            self.values.resize(index + 1, None);
        }
        self.values[index] = Some(value);
    }

    /// Unset a column, returning its previous value. The schema is unchanged.
    pub fn remove(&mut self, index: usize) -> Option<Value> {
        self.values.get_mut(index).and_then(Option::take)
    }

    pub fn remove_by_name(&mut self, name: &str) -> Option<Value> {
        let index = self.schema.index_of(name)?;
        self.remove(index)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_by_name(name).is_some()
    }

    /// Number of set members.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(name, value)` pairs in schema order, skipping unset columns.
    pub fn iter(&self) -> impl Iterator<Item = (Arc<str>, &Value)> + '_ {
        self.schema
            .names()
            .into_iter()
            .zip(self.values.iter())
            .filter_map(|(name, value)| value.as_ref().map(|value| (name, value)))
    }

    /// Map view of the set members. Duplicate names keep the first value.
    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut map = HashMap::with_capacity(self.values.len());
        for (name, value) in self.iter() {
            map.entry(name.to_string())
                .or_insert_with(|| value.clone());
        }
        map
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{Row")?;
        for (name, value) in self.iter() {
            write!(f, ", {} = {}", name, value)?;
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_skips_unset_columns() {
        let schema = Arc::new(RowSchema::new(["id", "name", "note"]));
        let mut row = Row::new(schema);
        row.set(0, 1_i32).unwrap();
        row.set(1, "x").unwrap();
        assert_eq!(row.to_string(), "{Row, id = 1, name = 'x'}");
    }

    #[test]
    fn empty_schema() {
        let row = Row::new(Arc::new(RowSchema::new(Vec::<String>::new())));
        assert_eq!(row.to_string(), "{Row}");
        assert!(row.is_empty());
    }
}
