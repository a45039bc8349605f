use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{Deserializer, DeserializerCache, GLOBAL_CACHE};
use crate::cursor::AsyncCursor;
use crate::error::{Error, Result};
use crate::grid::GridState;
use crate::opts::Opts;
use crate::shape::ColumnRange;
use crate::type_map::FromRow;

/// Awaitable counterpart of [`crate::sync::GridReader`].
///
/// `Drop` cannot await, so a row stream dropped before its end only marks its
/// grid as abandoned; the next read drains it and advances the cursor first.
pub struct AsyncGridReader<C: AsyncCursor> {
    cursor: C,
    state: GridState,
    cache: Arc<DeserializerCache>,
    abandoned: Option<usize>,
}

impl<C: AsyncCursor> AsyncGridReader<C> {
    pub fn new(cursor: C) -> Self {
        Self::with_cache(cursor, Arc::clone(&GLOBAL_CACHE))
    }

    pub fn with_cache(cursor: C, cache: Arc<DeserializerCache>) -> Self {
        Self {
            cursor,
            state: GridState::Active(0),
            cache,
            abandoned: None,
        }
    }

    pub fn with_opts(cursor: C, opts: &Opts) -> Self {
        Self::with_cache(cursor, Arc::clone(&opts.cache))
    }

    /// State as of the last completed operation. An abandoned grid still
    /// reports `Consumed` until the next read settles it.
    pub fn state(&self) -> GridState {
        self.state
    }

    pub fn grid_index(&self) -> Option<usize> {
        self.state.grid_index()
    }

    pub fn is_consumed(&self) -> bool {
        self.state == GridState::Disposed
    }

    pub async fn read<T: FromRow>(&mut self) -> Result<Vec<T>> {
        self.settle().await;
        let grid = self.state.next_grid()?;
        self.begin::<T>(grid).await?.try_collect().await
    }

    pub async fn read_unbuffered<T: FromRow>(&mut self) -> Result<AsyncGridRows<'_, C, T>> {
        self.settle().await;
        let grid = self.state.next_grid()?;
        self.begin(grid).await
    }

    /// Read grid `grid`, which must be the current one.
    pub async fn read_grid<T: FromRow>(
        &mut self,
        grid: usize,
        buffered: bool,
    ) -> Result<AsyncGridRows<'_, C, T>> {
        self.settle().await;
        if !buffered {
            return self.begin(grid).await;
        }
        let rows = self.begin::<T>(grid).await?.try_collect().await?;
        Ok(AsyncGridRows {
            reader: self,
            deserializer: None,
            buffered: Some(rows.into_iter()),
            grid,
            done: true,
        })
    }

    pub async fn read_first<T: FromRow>(&mut self) -> Result<Option<T>> {
        let mut rows = self.read_unbuffered::<T>().await?;
        let first = rows.next().await.transpose()?;
        rows.finish().await?;
        Ok(first)
    }

    pub async fn read_single<T: FromRow>(&mut self) -> Result<T> {
        let mut rows = self.read_unbuffered::<T>().await?;
        let first = rows
            .next()
            .await
            .ok_or_else(|| Error::InvalidInput("grid contains no rows".into()))??;
        if rows.next().await.transpose()?.is_some() {
            return Err(Error::InvalidInput("grid contains more than one row".into()));
        }
        Ok(first)
    }

    /// Stop reading. Later reads fail with `ObjectDisposed`.
    pub fn dispose(&mut self) {
        if self.state != GridState::Disposed {
            debug!(state = %self.state, "grid reader disposed");
        }
        self.abandoned = None;
        self.state = GridState::Disposed;
    }

    pub fn into_inner(self) -> C {
        self.cursor
    }

    #[tracing::instrument(skip_all, fields(grid = grid))]
    async fn begin<T: FromRow>(&mut self, grid: usize) -> Result<AsyncGridRows<'_, C, T>> {
        self.state.begin(grid)?;
        let deserializer = if self.cursor.column_count() == 0 {
            None
        } else {
            let built = self
                .cache
                .get_or_build::<T>(&self.cursor, ColumnRange::all(), false);
            match built {
                Ok(deserializer) => Some(deserializer),
                Err(err) => {
                    self.skip_grid(grid).await;
                    return Err(err);
                }
            }
        };
        Ok(AsyncGridRows {
            reader: self,
            deserializer,
            buffered: None,
            grid,
            done: false,
        })
    }

    async fn settle(&mut self) {
        if let Some(grid) = self.abandoned.take() {
            debug!(grid, "draining abandoned grid");
            self.skip_grid(grid).await;
        }
    }

    async fn finish_grid(&mut self, grid: usize) -> Result<()> {
        match self.cursor.advance_result_set().await {
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

    async fn skip_grid(&mut self, grid: usize) {
        loop {
            match self.cursor.advance_row().await {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(grid, error = %err, "cursor failed while skipping a grid");
                    self.state = GridState::Disposed;
                    return;
                }
            }
        }
        if let Err(err) = self.finish_grid(grid).await {
            warn!(grid, error = %err, "cursor failed while advancing past a grid");
        }
    }
}

/// Rows of one grid, pulled with [`AsyncGridRows::next`].
pub struct AsyncGridRows<'a, C: AsyncCursor, T: FromRow> {
    reader: &'a mut AsyncGridReader<C>,
    deserializer: Option<Deserializer<T>>,
    buffered: Option<std::vec::IntoIter<T>>,
    grid: usize,
    done: bool,
}

impl<C: AsyncCursor, T: FromRow> AsyncGridRows<'_, C, T> {
    pub fn grid(&self) -> usize {
        self.grid
    }

    pub async fn next(&mut self) -> Option<Result<T>> {
        if let Some(rows) = &mut self.buffered {
            return rows.next().map(Ok);
        }
        while !self.done {
            match self.reader.cursor.advance_row().await {
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
                    if let Err(err) = self.reader.finish_grid(self.grid).await {
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

    /// Collect the remaining rows. Stops at the first error; the rest of the
    /// grid is drained by the next read.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Skip the remaining rows and advance the cursor now.
    pub async fn finish(mut self) -> Result<()> {
        self.deserializer = None;
        while let Some(row) = self.next().await {
            row?;
        }
        Ok(())
    }
}

impl<C: AsyncCursor, T: FromRow> Drop for AsyncGridRows<'_, C, T> {
    fn drop(&mut self) {
        if !self.done {
            self.reader.abandoned = Some(self.grid);
        }
    }
}
