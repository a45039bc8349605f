//! Tests for the awaitable grid reader.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use zero_mapper::DeserializerCache;
use zero_mapper::r#async::AsyncGridReader;
use zero_mapper::constant::DbType;
use zero_mapper::cursor::{AsyncCursor, Record, VecCursor, VecResultSet};
use zero_mapper::error::{Error, Result};
use zero_mapper::grid::GridState;
use zero_mapper::r#macro::FromRow;
use zero_mapper::value::Value;

#[derive(Debug, PartialEq, FromRow)]
struct Item {
    id: i64,
    name: Option<String>,
}

fn ints(name: &'static str, values: &[i64]) -> VecResultSet {
    let mut set = VecResultSet::new([(name, DbType::I64)]);
    for v in values {
        set.push_row(vec![Value::from(*v)]).unwrap();
    }
    set
}

fn items() -> VecResultSet {
    VecResultSet::new([("id", DbType::I64), ("name", DbType::Text)])
        .row(vec![Value::from(1_i64), Value::from("one")])
        .unwrap()
        .row(vec![Value::from(2_i64), Value::Null])
        .unwrap()
}

fn reader(sets: Vec<VecResultSet>) -> AsyncGridReader<VecCursor> {
    AsyncGridReader::with_cache(VecCursor::new(sets), Arc::new(DeserializerCache::new()))
}

#[tokio::test]
async fn reads_grids_in_order() {
    let mut grids = reader(vec![items(), ints("total", &[2])]);

    let rows: Vec<Item> = grids.read().await.unwrap();
    assert_eq!(
        rows,
        vec![
            Item {
                id: 1,
                name: Some("one".to_owned()),
            },
            Item { id: 2, name: None },
        ]
    );
    let total: i64 = grids.read_single().await.unwrap();
    assert_eq!(total, 2);
    assert!(grids.is_consumed());
    assert!(matches!(
        grids.read::<i64>().await,
        Err(Error::ObjectDisposed)
    ));
}

#[tokio::test]
async fn abandoned_stream_is_drained_on_next_read() {
    let mut grids = reader(vec![ints("n", &[1, 2, 3]), ints("m", &[4, 5])]);
    {
        let mut rows = grids.read_unbuffered::<i64>().await.unwrap();
        assert_eq!(rows.grid(), 0);
        assert_eq!(rows.next().await.unwrap().unwrap(), 1);
    }
    let rest: Vec<i64> = grids.read().await.unwrap();
    assert_eq!(rest, vec![4, 5]);
    assert!(grids.is_consumed());
}

#[tokio::test]
async fn finish_advances_immediately() {
    let mut grids = reader(vec![ints("n", &[1, 2]), ints("m", &[3])]);
    let rows = grids.read_unbuffered::<i64>().await.unwrap();
    rows.finish().await.unwrap();
    assert_eq!(grids.grid_index(), Some(1));
    assert_eq!(grids.read_first::<i64>().await.unwrap(), Some(3));
}

#[tokio::test]
async fn rereading_is_out_of_order() {
    let mut grids = reader(vec![ints("n", &[1]), ints("m", &[2])]);
    let _: Vec<i64> = grids.read().await.unwrap();
    assert!(matches!(
        grids.read_grid::<i64>(0, true).await,
        Err(Error::OutOfOrderAccess { requested: 0, .. })
    ));

    let mut rows = grids.read_grid::<i64>(1, true).await.unwrap();
    assert_eq!(rows.next().await.unwrap().unwrap(), 2);
    assert!(rows.next().await.is_none());
}

#[tokio::test]
async fn read_single_rejects_many_rows() {
    let mut grids = reader(vec![ints("n", &[1, 2]), ints("m", &[3])]);
    assert!(matches!(
        grids.read_single::<i64>().await,
        Err(Error::InvalidInput(_))
    ));
    assert_eq!(grids.read_single::<i64>().await.unwrap(), 3);
}

#[tokio::test]
async fn build_failure_skips_the_grid() {
    let mut grids = reader(vec![
        VecResultSet::new([("at", DbType::DateTime)])
            .row(vec![Value::Null])
            .unwrap(),
        ints("n", &[4]),
    ]);
    assert!(matches!(
        grids.read::<i64>().await,
        Err(Error::ConfigurationError(_))
    ));
    assert_eq!(grids.read::<i64>().await.unwrap(), vec![4]);
}

#[tokio::test]
async fn readers_on_separate_tasks_share_the_cache() {
    let cache = Arc::new(DeserializerCache::new());
    let mut tasks = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        tasks.push(tokio::spawn(async move {
            let mut grids = AsyncGridReader::with_cache(VecCursor::new(vec![items()]), cache);
            grids.read::<Item>().await.map(|rows| rows.len())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }
    assert_eq!(cache.len(), 1);
}

/// Fails its second row advance with the error built by `error`.
struct Failing {
    inner: VecCursor,
    rows: usize,
    error: fn() -> Error,
}

impl Record for Failing {
    fn column_count(&self) -> usize {
        self.inner.column_count()
    }

    fn column_name(&self, index: usize) -> &str {
        self.inner.column_name(index)
    }

    fn column_type(&self, index: usize) -> DbType {
        self.inner.column_type(index)
    }

    fn value(&self, index: usize) -> Result<Value> {
        self.inner.value(index)
    }
}

impl AsyncCursor for Failing {
    async fn advance_row(&mut self) -> Result<bool> {
        self.rows += 1;
        if self.rows == 2 {
            return Err((self.error)());
        }
        AsyncCursor::advance_row(&mut self.inner).await
    }

    async fn advance_result_set(&mut self) -> Result<bool> {
        AsyncCursor::advance_result_set(&mut self.inner).await
    }
}

fn failing(error: fn() -> Error) -> AsyncGridReader<Failing> {
    let cursor = Failing {
        inner: VecCursor::new(vec![ints("n", &[1, 2, 3]), ints("m", &[4])]),
        rows: 0,
        error,
    };
    AsyncGridReader::with_cache(cursor, Arc::new(DeserializerCache::new()))
}

#[tokio::test]
async fn cursor_failure_disposes_the_reader() {
    let mut grids = failing(|| Error::cursor("connection reset"));
    assert!(matches!(grids.read::<i64>().await, Err(Error::Cursor(_))));
    assert!(grids.is_consumed());
    assert!(matches!(
        grids.read::<i64>().await,
        Err(Error::ObjectDisposed)
    ));
}

#[tokio::test]
async fn cancellation_unwinds_an_unbuffered_read() {
    let mut grids = failing(|| Error::Cancelled);
    {
        let mut rows = grids.read_unbuffered::<i64>().await.unwrap();
        assert_eq!(rows.next().await.unwrap().unwrap(), 1);
        assert!(matches!(rows.next().await, Some(Err(Error::Cancelled))));
        assert!(rows.next().await.is_none());
    }
    assert_eq!(grids.state(), GridState::Disposed);
    assert!(matches!(
        grids.read_first::<i64>().await,
        Err(Error::ObjectDisposed)
    ));
}
