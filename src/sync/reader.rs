use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{Deserializer, DeserializerCache, GLOBAL_CACHE};
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::grid::GridState;
use crate::opts::Opts;
use crate::shape::ColumnRange;
use crate::type_map::FromRow;

/// Sequential reader over the result sets ("grids") of one cursor.
///
/// Grids must be read once each, in order. A grid read in buffered mode is
/// exhausted before the rows are returned; an unbuffered grid advances the
/// cursor when its iterator finishes or is dropped.
pub struct GridReader<C: Cursor> {
    cursor: C,
    state: GridState,
    cache: Arc<DeserializerCache>,
}

impl<C: Cursor> GridReader<C> {
    pub fn new(cursor: C) -> Self {
        Self::with_cache(cursor, Arc::clone(&GLOBAL_CACHE))
    }

    pub fn with_cache(cursor: C, cache: Arc<DeserializerCache>) -> Self {
        Self {
            cursor,
            state: GridState::Active(0),
            cache,
        }
    }

    pub fn with_opts(cursor: C, opts: &Opts) -> Self {
        Self::with_cache(cursor, Arc::clone(&opts.cache))
    }

    pub fn state(&self) -> GridState {
        self.state
    }

    /// Index of the current grid, `None` once disposed.
    pub fn grid_index(&self) -> Option<usize> {
        self.state.grid_index()
    }

    /// Whether every grid has been read.
    pub fn is_consumed(&self) -> bool {
        self.state == GridState::Disposed
    }

    /// Read the next grid into a `Vec`.
    pub fn read<T: FromRow>(&mut self) -> Result<Vec<T>> {
        let grid = self.state.next_grid()?;
        self.begin(grid)?.collect()
    }

    /// Stream the next grid.
    pub fn read_unbuffered<T: FromRow>(&mut self) -> Result<GridIter<'_, C, T>> {
        let grid = self.state.next_grid()?;
        self.begin(grid)
    }

    /// Read grid `grid`, which must be the current one.
    pub fn read_grid<T: FromRow>(
        &mut self,
        grid: usize,
        buffered: bool,
    ) -> Result<GridRows<'_, C, T>> {
        let iter = self.begin(grid)?;
        if buffered {
            let rows = iter.collect::<Result<Vec<T>>>()?;
            Ok(GridRows::Buffered(rows.into_iter()))
        } else {
            Ok(GridRows::Unbuffered(iter))
        }
    }

    /// First row of the next grid. The rest of the grid is skipped.
    pub fn read_first<T: FromRow>(&mut self) -> Result<Option<T>> {
        self.read_unbuffered::<T>()?.next().transpose()
    }

    /// The only row of the next grid.
    pub fn read_single<T: FromRow>(&mut self) -> Result<T> {
        let mut iter = self.read_unbuffered::<T>()?;
        let first = iter
            .next()
            .ok_or_else(|| Error::InvalidInput("grid contains no rows".into()))??;
        if iter.next().transpose()?.is_some() {
            return Err(Error::InvalidInput("grid contains more than one row".into()));
        }
        Ok(first)
    }

    /// Stop reading. Later reads fail with `ObjectDisposed`.
    pub fn dispose(&mut self) {
        if self.state != GridState::Disposed {
            debug!(state = %self.state, "grid reader disposed");
        }
        self.state = GridState::Disposed;
    }

    pub fn into_inner(self) -> C {
        self.cursor
    }

    #[tracing::instrument(skip_all, fields(grid = grid))]
    fn begin<T: FromRow>(&mut self, grid: usize) -> Result<GridIter<'_, C, T>> {
        self.state.begin(grid)?;
        let deserializer = if self.cursor.column_count() == 0 {
            None
        } else {
            match self
                .cache
                .get_or_build::<T>(&self.cursor, ColumnRange::all(), false)
            {
                Ok(deserializer) => Some(deserializer),
                Err(err) => {
                    self.skip_grid(grid);
                    return Err(err);
                }
            }
        };
        Ok(GridIter {
            reader: self,
            deserializer,
            grid,
            done: false,
        })
    }

    /// Move the cursor past `grid`.
    fn finish_grid(&mut self, grid: usize) -> Result<()> {
        match self.cursor.advance_result_set() {
            Ok(more) => {
                self.state.advanced(grid, more);
                debug!(grid, more, "grid finished");
                Ok(())
            }
            Err(err) => {
                self.state = GridState::Disposed;
                Err(err)
            }
        }
    }

    /// Drain the rest of `grid` and advance, without reporting errors.
    fn skip_grid(&mut self, grid: usize) {
        loop {
            match self.cursor.advance_row() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(grid, error = %err, "cursor failed while skipping a grid");
                    self.state = GridState::Disposed;
                    return;
                }
            }
        }
        if let Err(err) = self.finish_grid(grid) {
            warn!(grid, error = %err, "cursor failed while advancing past a grid");
        }
    }
}

/// Rows of one grid.
pub enum GridRows<'a, C: Cursor, T: FromRow> {
    Buffered(std::vec::IntoIter<T>),
    Unbuffered(GridIter<'a, C, T>),
}

impl<C: Cursor, T: FromRow> Iterator for GridRows<'_, C, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            GridRows::Buffered(rows) => rows.next().map(Ok),
            GridRows::Unbuffered(iter) => iter.next(),
        }
    }
}

/// Lazily materialized rows of one grid.
///
/// Dropping the iterator before the end skips the remaining rows and moves
/// the cursor to the next grid.
pub struct GridIter<'a, C: Cursor, T: FromRow> {
    reader: &'a mut GridReader<C>,
    deserializer: Option<Deserializer<T>>,
    grid: usize,
    done: bool,
}

impl<C: Cursor, T: FromRow> GridIter<'_, C, T> {
    pub fn grid(&self) -> usize {
        self.grid
    }
}

impl<C: Cursor, T: FromRow> Iterator for GridIter<'_, C, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.reader.cursor.advance_row() {
                Ok(true) => {
                    let Some(deserializer) = &self.deserializer else {
                        continue;
                    };
                    match deserializer.deserialize(&self.reader.cursor) {
                        Ok(Some(row)) => return Some(Ok(row)),
                        Ok(None) => {}
                        Err(err) => {
                            if err.is_fatal_for_cursor() {
                                self.done = true;
                                self.reader.state = GridState::Disposed;
                            }
                            return Some(Err(err));
                        }
                    }
                }
                Ok(false) => {
                    self.done = true;
                    if let Err(err) = self.reader.finish_grid(self.grid) {
                        return Some(Err(err));
                    }
                }
                Err(err) => {
                    self.done = true;
                    self.reader.state = GridState::Disposed;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

impl<C: Cursor, T: FromRow> Drop for GridIter<'_, C, T> {
    fn drop(&mut self) {
        if !self.done {
            self.done = true;
            self.reader.skip_grid(self.grid);
        }
    }
}
