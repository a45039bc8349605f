//! Awaitable multi-result reader.

mod reader;

pub use reader::{AsyncGridReader, AsyncGridRows};
