//! Dex Core: backend-agnostic data model shared across the dex toolchain
//!
//! This crate holds the pieces of the compiler's data model that don't
//! depend on LLVM or on any particular compilation stage:
//!
//! - `span`: source locations and spans, combinable and totally ordered
//! - `diagnostics`: an ordered, deduplicated diagnostic set with notes
//! - `literal`: the tagged union used for literal AST node values
//!
//! Keeping these free of the LLVM dependency means they can be reused by
//! tooling (formatters, language servers) that has no business linking
//! against `inkwell`.

pub mod diagnostics;
pub mod literal;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSet, Severity};
pub use literal::Literal;
pub use span::{Location, Span};
