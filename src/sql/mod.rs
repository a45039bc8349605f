//! SQL text rewriting.
//!
//! Templates use `@name` or `:name` placeholders, `{=name}` literal tokens,
//! or bare `?` markers. A named placeholder bound to a list expands into one
//! placeholder per element:
//!
//! ```
//! use zero_mapper::sql::{Params, rewrite};
//!
//! let params = Params::new().bind_list("ids", [1, 2, 3]);
//! let rewritten = rewrite("SELECT * FROM t WHERE id IN @ids", &params)?;
//! assert_eq!(rewritten.sql, "SELECT * FROM t WHERE id IN (@ids_0,@ids_1,@ids_2)");
//! assert_eq!(rewritten.bindings.len(), 3);
//! # Ok::<(), zero_mapper::error::Error>(())
//! ```

mod params;
mod parse;
mod rewrite;

pub use params::{ParamValue, Params};
pub use parse::{ParsedTemplate, StatementKind, Token, TokenKind, classify, parse};
pub use rewrite::{Rewriter, Rewritten, render, rewrite};
