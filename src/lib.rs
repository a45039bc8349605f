//! Shape-aware row materialization and SQL parameter rewriting.
//!
//! The crate sits between query text and typed results:
//! - [`sql`] rewrites templated query text into final text plus flat bindings,
//! - [`cache::DeserializerCache`] builds one deserializer per (type, column shape)
//!   and reuses it for every later result with the same shape,
//! - [`sync::GridReader`] and [`r#async::AsyncGridReader`] walk the result sets
//!   of one cursor in order.
//!
//! The data source is a collaborator implementing [`cursor::Cursor`] or
//! [`cursor::AsyncCursor`]. Nothing in this crate performs I/O.

pub mod cache;
pub mod constant;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod grid;
pub mod handler;
pub mod materialize;
mod opts;
pub mod polymorphic;
pub mod row;
pub mod shape;
pub mod sql;
pub mod type_map;
pub mod value;

#[cfg(feature = "sync")]
pub mod sync;

#[cfg(feature = "async")]
pub mod r#async;

pub use cache::{DeserializerCache, GLOBAL_CACHE};
pub use opts::Opts;
pub use row::{Row, RowSchema};
pub use type_map::FromRow;
pub use value::Value;

#[cfg(feature = "derive")]
pub mod r#macro {
    pub use zero_mapper_derive::{DbEnum, FromRow};
}

/// Drop every cached deserializer of the process-wide cache.
pub fn purge_query_cache() -> usize {
    GLOBAL_CACHE.purge_all()
}

#[cfg(test)]
mod cache_test;
