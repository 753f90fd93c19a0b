//! IR generation: lowers the annotated, folded AST into a textual LLVM IR
//! module, plus the execution-context layout the generated functions index
//! into.
//!
//! Emitting text rather than building an IR tree through `inkwell` keeps
//! this stage free of any LLVM binding; only `backend.rs` links against
//! `inkwell`, to parse what this module writes.

pub mod expr;
pub mod layout;
pub mod unwind;

use std::fmt;

use crate::ast::{DeclKind, Program};
use crate::fold::ConstantStore;
use crate::functions::FunctionLibrary;
use crate::types::TypeTable;

pub use layout::ContextLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGenError(pub String);

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for CodeGenError {}

/// The emitted module text plus the metadata the compile driver and backend
/// need: context size/alignment and which declarations got a setter vs. a
/// getter entry point.
pub struct GeneratedModule {
    pub ir: String,
    pub context_size: u32,
    pub context_align: u32,
    pub entries: Vec<DeclarationEntry>,
}

#[derive(Debug, Clone)]
pub struct DeclarationEntry {
    pub name: String,
    pub symbol: String,
    pub decl_kind: DeclKind,
}

/// Emit the whole module: layout, per-declaration entries, and
/// `__init_rctx`/`__destruct_rctx`.
pub fn generate_module(
    program: &Program,
    types: &TypeTable,
    functions: &FunctionLibrary,
    constants: &ConstantStore,
    use_intrinsics: bool,
) -> Result<GeneratedModule, CodeGenError> {
    let layout = layout::compute_layout(program, types)?;

    let mut globals = String::new();
    globals.push_str("; generated by dexc\n");
    globals.push_str(&layout.layout_comment(types));
    globals.push('\n');
    globals.push_str(&constants.emit_globals(types));
    globals.push('\n');

    let mut body = String::new();
    let mut entries = Vec::new();
    for def in &program.definitions {
        let crate::ast::NodeKind::Definition { name, decl_kind, declared_type, initializer } = &def.kind else {
            return Err(CodeGenError("top-level node is not a definition".to_string()));
        };
        let symbol = expr::emit_declaration(
            &mut body,
            &mut globals,
            name,
            *decl_kind,
            *declared_type,
            initializer.as_ref(),
            &layout,
            types,
            functions,
            constants,
            use_intrinsics,
        )?;
        entries.push(DeclarationEntry { name: name.clone(), symbol, decl_kind: *decl_kind });
    }

    expr::emit_init_rctx(&mut body, &mut globals, &layout, types);
    expr::emit_destruct_rctx(&mut body, &mut globals, &layout, types);

    let mut ir = globals;
    ir.push_str(&body);

    Ok(GeneratedModule {
        ir,
        context_size: layout.tail_size,
        context_align: layout.tail_align,
        entries,
    })
}
