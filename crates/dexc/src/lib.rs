//! Compile driver: wires lexer → parser → type inference → constant
//! folding → IR generation → JIT linking into one entry point, plus the
//! runtime execution-context lifecycle the linked program is driven
//! through.

pub mod ast;
pub mod backend;
pub mod builtins;
pub mod codegen;
pub mod config;
pub mod exec_context;
pub mod fold;
pub mod functions;
pub mod infer;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod registry;
pub mod symbols;
pub mod types;

use dex_core::{Diagnostic, DiagnosticKind, DiagnosticSet, Location, Span};

use ast::CompileEnv;
use backend::CompiledProgram;
use builtins::BuiltinModule;
use codegen::{ContextLayout, DeclarationEntry, GeneratedModule};
use config::CompilerConfig;
use functions::FunctionLibrary;
use registry::{register_all, Module};
use symbols::SymbolTable;
use types::TypeTable;

/// Either the linked program plus the metadata needed to drive it, or
/// the full accumulated diagnostic set — mutually exclusive, never both.
pub enum CompileResult {
    Success {
        program: CompiledProgram,
        layout: ContextLayout,
        entries: Vec<DeclarationEntry>,
        /// Present only when the caller asked to keep the generated IR
        /// text around (the CLI's `--emit-llvm`).
        ir: Option<String>,
    },
    Failure(DiagnosticSet),
}

impl CompileResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompileResult::Success { .. })
    }
}

fn single_failure(d: Diagnostic) -> CompileResult {
    let mut set = DiagnosticSet::new();
    set.push(d);
    CompileResult::Failure(set)
}

fn internal_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(DiagnosticKind::Internal, Span::point(Location::new(1, 1)), message.into())
}

/// Registers the built-in type/function module plus any additional host
/// modules, then compiles `source` under `config`.
pub fn compile(source: &str, config: &CompilerConfig, host_modules: &[&dyn Module]) -> CompileResult {
    let (types, functions) = seed_library(host_modules);
    let mut symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
    let env = CompileEnv::new(types.unresolved());

    let parser = match parser::Parser::new(source, &env, &types, &functions, &mut symbols) {
        Ok(p) => p,
        Err(fatal) => return single_failure(fatal),
    };
    let (program, mut diags) = match parser.parse() {
        Ok(result) => result,
        Err(fatal) => return single_failure(fatal),
    };

    diags.extend(infer::infer_program(&env, &program, &types, &functions, &symbols));
    if !diags.is_empty() {
        return CompileResult::Failure(diags);
    }

    let constants = match fold::fold_program(&env, &program, &types, &functions, config.fold_constants) {
        Ok(store) => store,
        Err(e) => return single_failure(e.0),
    };

    let layout = match codegen::layout::compute_layout(&program, &types) {
        Ok(l) => l,
        Err(e) => return single_failure(internal_error(e.0)),
    };

    let GeneratedModule { ir, entries, .. } =
        match codegen::generate_module(&program, &types, &functions, &constants, config.use_intrinsics) {
            Ok(m) => m,
            Err(e) => return single_failure(internal_error(e.0)),
        };

    let compiled = match backend::link(&ir, config.opt_level, &types, &functions, constants) {
        Ok(p) => p,
        Err(e) => return single_failure(internal_error(e.0)),
    };

    CompileResult::Success {
        program: compiled,
        layout,
        entries,
        ir: config.emit_llvm.then_some(ir),
    }
}

fn seed_library(host_modules: &[&dyn Module]) -> (TypeTable, FunctionLibrary) {
    let mut types = TypeTable::new();
    let mut functions = FunctionLibrary::new();
    let builtin = BuiltinModule;
    let mut modules: Vec<&dyn Module> = Vec::with_capacity(host_modules.len() + 1);
    modules.push(&builtin);
    modules.extend_from_slice(host_modules);
    register_all(&mut types, &mut functions, &modules);
    (types, functions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_definition_reports_one_diagnostic_with_a_note() {
        let cfg = CompilerConfig::new();
        let result = compile("expr x: Integer = 1; expr x: Integer = 2;", &cfg, &[]);
        match result {
            CompileResult::Failure(diags) => {
                assert_eq!(diags.len(), 1);
            }
            CompileResult::Success { .. } => panic!("expected a duplicate-identifier failure"),
        }
    }

    #[test]
    fn well_typed_program_compiles_and_links() {
        let cfg = CompilerConfig::new();
        let result = compile("expr a: Integer = 1 + 2;", &cfg, &[]);
        assert!(result.is_success());
    }
}
