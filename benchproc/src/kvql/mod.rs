//! A small key/value query language.
//!
//! A query is a boolean expression over `key:value` matches:
//!
//! ```text
//! goos:linux .unit:(ns/op B/op) OR -/size:1.*
//! ```
//!
//! - Adjacent matches are implicitly ANDed, and bind tighter than the
//!   explicit `AND` and `OR` keywords, which bind in that order.
//! - `-` negates a match or parenthesized subexpression.
//! - `*` matches everything.
//! - `key:(a b c)` matches any of the listed values.
//! - Values are regular expressions that must match the entire value.
//!   Quote keys or values containing spaces or operators with `"`.
//!
//! The query language only describes the tree; [`Filter`](crate::filter::Filter)
//! decides what keys mean and evaluates it against records.

mod parse;
mod query;
mod token;

pub use parse::parse;
pub use query::{Op, Pattern, Query};
pub use token::{Token, TokenKind, tokenize};
