//! Tests for the FromRow and DbEnum derive macros.
//!
//! Run with: cargo test --features derive --test derive

#![allow(dead_code)]

use std::sync::Arc;

use pretty_assertions::assert_eq;
use zero_mapper::DeserializerCache;
use zero_mapper::constant::DbType;
use zero_mapper::cursor::{VecCursor, VecResultSet};
use zero_mapper::error::Error;
use zero_mapper::r#macro::{DbEnum, FromRow};
use zero_mapper::sync::GridReader;
use zero_mapper::value::Value;

// ============================================================================
// Type definitions
// ============================================================================

#[derive(Debug, PartialEq, FromRow)]
struct User {
    id: i64,
    name: String,
    age: u8,
}

#[derive(Debug, PartialEq, FromRow)]
struct UserWithOptional {
    id: i64,
    name: String,
    email: Option<String>,
}

#[derive(Debug, PartialEq, FromRow)]
struct Renamed {
    #[from_row(rename = "user_id")]
    id: i64,
    #[from_row(skip)]
    cached: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, DbEnum)]
enum Status {
    Active = 1,
    Banned = 2,
    Unknown = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, DbEnum)]
enum Color {
    Red,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, DbEnum)]
enum Priority {
    High = 1,
    Low = 2,
}

#[derive(Debug, PartialEq, FromRow)]
struct Account {
    id: i64,
    status: Status,
    previous: Option<Status>,
}

// ============================================================================
// Helpers
// ============================================================================

fn reader(set: VecResultSet) -> GridReader<VecCursor> {
    GridReader::with_cache(
        VecCursor::new(vec![set]),
        Arc::new(DeserializerCache::new()),
    )
}

// ============================================================================
// FromRow
// ============================================================================

#[test]
fn maps_columns_by_name() {
    let set = VecResultSet::new([
        ("age", DbType::I32),
        ("NAME", DbType::Text),
        ("id", DbType::I64),
    ])
    .row(vec![Value::from(31), Value::from("alice"), Value::from(1_i64)])
    .unwrap();

    let users: Vec<User> = reader(set).read().unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "alice".to_owned(),
            age: 31,
        }]
    );
}

#[test]
fn missing_columns_keep_null_value() {
    let set = VecResultSet::new([("id", DbType::I64), ("extra", DbType::Text)])
        .row(vec![Value::from(2_i64), Value::from("ignored")])
        .unwrap();

    let users: Vec<UserWithOptional> = reader(set).read().unwrap();
    assert_eq!(
        users,
        vec![UserWithOptional {
            id: 2,
            name: String::new(),
            email: None,
        }]
    );
}

#[test]
fn null_values() {
    let set = VecResultSet::new([
        ("id", DbType::I64),
        ("name", DbType::Text),
        ("email", DbType::Text),
    ])
    .row(vec![Value::from(3_i64), Value::Null, Value::Null])
    .unwrap()
    .row(vec![Value::from(4_i64), Value::from("b"), Value::from("b@x")])
    .unwrap();

    let users: Vec<UserWithOptional> = reader(set).read().unwrap();
    assert_eq!(users[0].name, "");
    assert_eq!(users[0].email, None);
    assert_eq!(users[1].email.as_deref(), Some("b@x"));
}

#[test]
fn rename_and_skip() {
    let set = VecResultSet::new([("user_id", DbType::I64), ("cached", DbType::Bytes)])
        .row(vec![Value::from(9_i64), Value::Bytes(vec![1, 2])])
        .unwrap();

    let rows: Vec<Renamed> = reader(set).read().unwrap();
    assert_eq!(
        rows,
        vec![Renamed {
            id: 9,
            cached: Vec::new(),
        }]
    );
}

#[test]
fn conversion_error_reports_column() {
    let set = VecResultSet::new([("id", DbType::Text)])
        .row(vec![Value::from("abc")])
        .unwrap();

    let err = reader(set).read::<User>().unwrap_err();
    assert!(
        matches!(err, Error::ConfigurationError(ref msg) if msg.contains("'id'")),
        "{}",
        err
    );
}

// ============================================================================
// DbEnum
// ============================================================================

#[test]
fn enum_from_discriminant_and_name() {
    let set = VecResultSet::new([
        ("id", DbType::I64),
        ("status", DbType::I32),
        ("previous", DbType::Text),
    ])
    .row(vec![Value::from(1_i64), Value::from(2), Value::from("active")])
    .unwrap()
    .row(vec![Value::from(2_i64), Value::Null, Value::Null])
    .unwrap();

    let accounts: Vec<Account> = reader(set).read().unwrap();
    assert_eq!(
        accounts,
        vec![
            Account {
                id: 1,
                status: Status::Banned,
                previous: Some(Status::Active),
            },
            Account {
                id: 2,
                status: Status::Unknown,
                previous: None,
            },
        ]
    );
}

#[test]
fn enum_as_scalar() {
    let set = VecResultSet::new([("color", DbType::Text)])
        .row(vec![Value::from("GREEN")])
        .unwrap()
        .row(vec![Value::from("Red")])
        .unwrap();

    let colors: Vec<Color> = reader(set).read().unwrap();
    assert_eq!(colors, vec![Color::Green, Color::Red]);
}

#[test]
fn enum_null_without_zero_discriminant_is_first_variant() {
    let set = VecResultSet::new([("priority", DbType::I64)])
        .row(vec![Value::Null])
        .unwrap();

    let priorities: Vec<Priority> = reader(set).read().unwrap();
    assert_eq!(priorities, vec![Priority::High]);
}

#[test]
fn enum_unknown_value() {
    let set = VecResultSet::new([("id", DbType::I64), ("status", DbType::I64)])
        .row(vec![Value::from(1_i64), Value::from(7_i64)])
        .unwrap();

    let err = reader(set).read::<Account>().unwrap_err();
    assert!(matches!(err, Error::Conversion(_)), "{}", err);
}

#[test]
fn enum_rejects_float_columns() {
    let set = VecResultSet::new([("status", DbType::F64)])
        .row(vec![Value::from(1.0_f64)])
        .unwrap();

    assert!(matches!(
        reader(set).read::<Status>(),
        Err(Error::ConfigurationError(_))
    ));
}
