//! Symbol table: a name→symbol map seeded from the type system and
//! function library, with declarations added as parsing proceeds.
//!
//! The language has no loops, blocks or modules, so a single flat scope is
//! sufficient — "scoped" reduces to this one top-level scope plus the
//! builtin namespace it's seeded from.

use dex_core::{Diagnostic, DiagnosticKind, Note, Span};
use std::collections::HashMap;

use crate::functions::FunctionLibrary;
use crate::types::{TypeId, TypeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Type,
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// The symbol's type: for `Variable` this is the declared/result type;
    /// for `Type` this is the type itself; for `Function`/`Unresolved` it
    /// is the table's sentinel.
    pub ty: TypeId,
    /// Definition span, used to build "previous definition here" notes.
    /// Host-seeded `Type`/`Function` symbols have no source span.
    pub span: Option<Span>,
}

pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, SymbolId>,
}

impl SymbolTable {
    /// Seed the table from the type system and function library.
    pub fn seeded(types: &TypeTable, functions: &FunctionLibrary, unresolved_ty: TypeId) -> Self {
        let mut table = SymbolTable {
            symbols: Vec::new(),
            by_name: HashMap::new(),
        };
        for name in types.all_names() {
            let ty = types.lookup(&name).unwrap();
            table.insert_seed(Symbol {
                name,
                kind: SymbolKind::Type,
                ty,
                span: None,
            });
        }
        for name in functions.all_names() {
            if table.by_name.contains_key(&name) {
                continue;
            }
            table.insert_seed(Symbol {
                name,
                kind: SymbolKind::Function,
                ty: unresolved_ty,
                span: None,
            });
        }
        table
    }

    fn insert_seed(&mut self, sym: Symbol) {
        let id = SymbolId(self.symbols.len());
        self.by_name.insert(sym.name.clone(), id);
        self.symbols.push(sym);
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// Declare a new `Variable` symbol (a `var`/`const`/`expr` definition).
    /// Returns a `NameError` diagnostic with a note at the prior definition
    /// if `name` is already declared.
    pub fn declare(&mut self, name: &str, ty: TypeId, span: Span) -> Result<SymbolId, Diagnostic> {
        if let Some(prev) = self.by_name.get(name).copied() {
            let prev_span = self.symbols[prev.0].span;
            let mut diag = Diagnostic::new(
                DiagnosticKind::Name,
                span,
                format!("Duplicate identifier '{name}'"),
            );
            if let Some(prev_span) = prev_span {
                diag = diag.with_note(Note::new(prev_span, "previous definition here"));
            }
            return Err(diag);
        }
        let id = SymbolId(self.symbols.len());
        self.by_name.insert(name.to_string(), id);
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            ty,
            span: Some(span),
        });
        Ok(id)
    }
}
