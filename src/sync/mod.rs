//! Blocking multi-result reader.

mod reader;

pub use reader::{GridIter, GridReader, GridRows};
