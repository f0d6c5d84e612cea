//! Namespace paths
//!
//! - **tokenizer**: split and decode dotted patterns, classify requests
//! - **token**: typed tokens and the scope they pin
//! - **glob**: quoting of backend names and wildcard matching

pub mod glob;
pub mod token;
pub mod tokenizer;

pub use glob::{has_magic, metric_quote, PathGlob};
pub use token::{Scope, Token, TokenKind};
pub use tokenizer::{parse_query, tokenize, ParsedQuery, RequestKind, Segment};
