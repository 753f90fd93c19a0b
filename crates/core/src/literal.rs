//! The tagged literal value union.
//!
//! String literals borrow from the compile-env's literal arena rather than
//! owning a heap buffer; everything else is copied inline.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    StringRef(&'a str),
}

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Int64(i) => write!(f, "{}", i),
            Literal::Float64(v) => write!(f, "{}", v),
            Literal::StringRef(s) => write!(f, "{:?}", s),
        }
    }
}
