use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;

use crate::cache::DeserializerCache;
use crate::constant::DbType;
use crate::cursor::{Cursor, VecCursor, VecResultSet};
use crate::error::Error;
use crate::handler::TypeHandlers;
use crate::shape::ColumnRange;
use crate::value::Value;

fn cursor(columns: [(&'static str, DbType); 2], rows: Vec<Vec<Value>>) -> VecCursor {
    let mut set = VecResultSet::new(columns);
    for row in rows {
        set.push_row(row).unwrap();
    }
    let mut cursor = VecCursor::new(vec![set]);
    assert!(Cursor::advance_row(&mut cursor).unwrap());
    cursor
}

fn pair(id: i64, name: &str) -> VecCursor {
    cursor(
        [("id", DbType::I64), ("name", DbType::Text)],
        vec![vec![Value::from(id), Value::from(name)]],
    )
}

#[test]
fn same_shape_builds_once() {
    let cache = DeserializerCache::new();
    let first = pair(1, "a");
    let second = pair(2, "b");

    let d1 = cache
        .get_or_build::<(i64, String)>(&first, ColumnRange::all(), false)
        .unwrap();
    let d2 = cache
        .get_or_build::<(i64, String)>(&second, ColumnRange::all(), false)
        .unwrap();

    assert_eq!(cache.stats().builds, 1);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(d2.hits(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(d1.deserialize(&first).unwrap(), Some((1, "a".to_owned())));
    assert_eq!(d2.deserialize(&second).unwrap(), Some((2, "b".to_owned())));
}

#[test]
fn key_components_separate_entries() {
    let cache = DeserializerCache::new();
    let record = pair(1, "a");

    cache
        .get_or_build::<(i64, String)>(&record, ColumnRange::all(), false)
        .unwrap();
    cache
        .get_or_build::<(i64, String)>(&record, ColumnRange::all(), true)
        .unwrap();
    cache
        .get_or_build::<(i64,)>(&record, ColumnRange::new(0, 1), false)
        .unwrap();
    cache
        .get_or_build::<String>(&record, ColumnRange::starting_at(1), false)
        .unwrap();
    cache
        .get_or_build::<Value>(&record, ColumnRange::all(), false)
        .unwrap();

    assert_eq!(cache.stats().builds, 5);
    assert_eq!(cache.len(), 5);

    let renamed = cursor(
        [("ID", DbType::I64), ("name", DbType::Text)],
        vec![vec![Value::from(1_i64), Value::from("a")]],
    );
    cache
        .get_or_build::<Value>(&renamed, ColumnRange::all(), false)
        .unwrap();
    assert_eq!(cache.stats().builds, 6);
}

#[test]
fn open_range_hits_explicit_entry() {
    let cache = DeserializerCache::new();
    let record = pair(1, "a");
    cache
        .get_or_build::<String>(&record, ColumnRange::new(1, 1), false)
        .unwrap();
    cache
        .get_or_build::<String>(&record, ColumnRange::starting_at(1), false)
        .unwrap();
    assert_eq!(cache.stats().builds, 1);
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn build_errors_are_not_cached() {
    let cache = DeserializerCache::new();
    let record = cursor(
        [("at", DbType::DateTime), ("name", DbType::Text)],
        vec![vec![Value::Null, Value::Null]],
    );
    for _ in 0..2 {
        assert!(matches!(
            cache.get_or_build::<i64>(&record, ColumnRange::all(), false),
            Err(Error::ConfigurationError(_))
        ));
    }
    assert!(cache.is_empty());
    assert_eq!(cache.stats().builds, 0);
}

#[test]
fn range_is_checked_before_lookup() {
    let cache = DeserializerCache::new();
    let record = pair(1, "a");
    assert!(matches!(
        cache.get_or_build::<i64>(&record, ColumnRange::new(1, 5), false),
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        cache.get_or_build::<i64>(&record, ColumnRange::new(1, usize::MAX), false),
        Err(Error::InvalidInput(_))
    ));
    assert!(cache.is_empty());
}

#[test]
fn purge_by_type() {
    let cache = DeserializerCache::new();
    let record = pair(1, "a");
    let kept = cache
        .get_or_build::<i64>(&record, ColumnRange::all(), false)
        .unwrap();
    cache
        .get_or_build::<Value>(&record, ColumnRange::all(), false)
        .unwrap();

    assert_eq!(cache.purge_type::<i64>(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.purge_type::<i64>(), 0);

    // A handed-out deserializer survives the purge.
    assert_eq!(kept.deserialize(&record).unwrap(), Some(1));

    cache
        .get_or_build::<i64>(&record, ColumnRange::all(), false)
        .unwrap();
    assert_eq!(cache.stats().builds, 3);

    assert_eq!(cache.purge_all(), 2);
    assert!(cache.is_empty());
    assert_eq!(cache.stats().purges, 3);
}

#[test]
fn registry_changes_apply_after_purge() {
    let handlers = Arc::new(TypeHandlers::new());
    let cache = DeserializerCache::with_registry(Arc::clone(&handlers) as _);
    let record = pair(5, "a");

    let plain = cache
        .get_or_build::<i64>(&record, ColumnRange::all(), false)
        .unwrap();
    assert_eq!(plain.deserialize(&record).unwrap(), Some(5));

    handlers.add::<i64>(|value: Value| -> crate::error::Result<Value> {
        match value {
            Value::SignedInt(v) => Ok(Value::SignedInt(v * 10)),
            other => Ok(other),
        }
    });
    let stale = cache
        .get_or_build::<i64>(&record, ColumnRange::all(), false)
        .unwrap();
    assert_eq!(stale.deserialize(&record).unwrap(), Some(5));

    cache.purge_type::<i64>();
    let fresh = cache
        .get_or_build::<i64>(&record, ColumnRange::all(), false)
        .unwrap();
    assert_eq!(fresh.deserialize(&record).unwrap(), Some(50));
}

#[test]
fn concurrent_lookups_agree() {
    let cache = Arc::new(DeserializerCache::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                let record = pair(i, "t");
                let deserializer = cache
                    .get_or_build::<(i64, String)>(&record, ColumnRange::all(), false)
                    .unwrap();
                deserializer.deserialize(&record).unwrap()
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let row = handle.join().unwrap();
        assert_eq!(row, Some((i as i64, "t".to_owned())));
    }
    assert_eq!(cache.len(), 1);
    let stats = cache.stats();
    assert_eq!(stats.builds + stats.hits, 8);
}
