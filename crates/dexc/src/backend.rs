//! JIT linker: parses the textual IR module, applies the optimization
//! pipeline for the configured tier, and resolves every external symbol
//! the generated module calls against the function library, the type
//! table's lifetime callbacks, and the constant store's own storage.
//!
//! Only this module links against `inkwell`; every earlier stage deals in
//! plain strings so the rest of the compiler can be exercised without an
//! LLVM toolchain on the host.

use std::fmt;

use inkwell::context::Context;
use inkwell::execution_engine::{ExecutionEngine, FunctionLookupError};
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use inkwell::passes::PassManager;

use crate::config::OptimizationLevel;
use crate::fold::ConstantStore;
use crate::functions::FunctionLibrary;
use crate::types::TypeTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub String);

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for BackendError {}

/// Owns the JIT-linked module. Must outlive every execution context built
/// against it, since the context's constructors/destructors and every
/// declaration's entry point live inside the JIT's code cache.
pub struct CompiledProgram {
    context: &'static Context,
    module: Module<'static>,
    engine: ExecutionEngine<'static>,
    // Kept alive for as long as the JIT-linked code might call back into
    // `Complex` constants' storage.
    _constants: ConstantStore,
}

impl CompiledProgram {
    /// Address of a linked symbol (a declaration's getter/setter, or
    /// `__init_rctx`/`__destruct_rctx`). Unknown names are an error.
    pub fn lookup(&self, name: &str) -> Result<usize, BackendError> {
        match self.engine.get_function_address(name) {
            Ok(addr) => Ok(addr),
            Err(FunctionLookupError::JITNotEnabled) => {
                Err(BackendError("JIT execution engine not enabled".to_string()))
            }
            Err(FunctionLookupError::FunctionNotFound) => {
                Err(BackendError(format!("no such symbol '{name}'")))
            }
        }
    }
}

/// Parse `ir`, bind every external symbol the module references, apply
/// the optimization pipeline for `opt_level`, and hand back the linked
/// program. `constants` is moved in and kept alive alongside the module,
/// since `Complex` constants are addressed directly by the native
/// pointers its entries own.
pub fn link(
    ir: &str,
    opt_level: OptimizationLevel,
    types: &TypeTable,
    functions: &FunctionLibrary,
    constants: ConstantStore,
) -> Result<CompiledProgram, BackendError> {
    // The engine and module both borrow the context for their lifetime;
    // `CompiledProgram` needs to own all three together, so the context
    // is leaked to get a `'static` borrow. One context per compiled
    // program is the expected lifecycle: a `CompileResult` is built once
    // and lives for the process, or is dropped as a unit.
    let context: &'static Context = Box::leak(Box::new(Context::create()));

    let buffer = MemoryBuffer::create_from_memory_range_copy(ir.as_bytes(), "dex_module");
    let module = context
        .create_module_from_ir(buffer)
        .map_err(|e| BackendError(format!("failed to parse generated IR: {e}")))?;

    if opt_level != OptimizationLevel::O0 {
        let pm = PassManager::create(());
        match opt_level {
            OptimizationLevel::O1 => {
                pm.add_instruction_combining_pass();
                pm.add_reassociate_pass();
            }
            OptimizationLevel::O2 => {
                pm.add_instruction_combining_pass();
                pm.add_reassociate_pass();
                pm.add_gvn_pass();
                pm.add_cfg_simplification_pass();
            }
            OptimizationLevel::O3 => {
                pm.add_instruction_combining_pass();
                pm.add_reassociate_pass();
                pm.add_gvn_pass();
                pm.add_cfg_simplification_pass();
                pm.add_function_inlining_pass();
                pm.add_tail_call_elimination_pass();
            }
            OptimizationLevel::O0 => unreachable!(),
        }
        pm.run_on(&module);
    }

    let engine = module
        .create_jit_execution_engine(opt_level.to_inkwell())
        .map_err(|e| BackendError(format!("failed to create JIT execution engine: {e}")))?;

    bind_host_symbols(&module, &engine, types, functions, &constants);

    Ok(CompiledProgram { context, module, engine, _constants: constants })
}

fn bind_host_symbols(
    module: &Module<'static>,
    engine: &ExecutionEngine<'static>,
    types: &TypeTable,
    functions: &FunctionLibrary,
    constants: &ConstantStore,
) {
    if let Some(func) = module.get_function("dex_string_from_static") {
        engine.add_global_mapping(&func, crate::builtins::dex_string_from_static as usize);
    }

    for desc in functions.all() {
        if let Some(func) = module.get_function(&desc.symbol) {
            engine.add_global_mapping(&func, desc.entry as usize);
        }
    }

    for info in types.all() {
        if let Some(d) = &info.lifetime.destructor {
            if let Some(func) = module.get_function(&d.symbol) {
                engine.add_global_mapping(&func, d.entry as usize);
            }
        }
        if let Some(c) = &info.lifetime.copy_ctor {
            if let Some(func) = module.get_function(&c.symbol) {
                engine.add_global_mapping(&func, c.entry as usize);
            }
        }
        if let Some(m) = &info.lifetime.move_ctor {
            if let Some(func) = module.get_function(&m.symbol) {
                engine.add_global_mapping(&func, m.entry as usize);
            }
        }
        if let crate::types::DefaultConstruct::Call(native) = &info.lifetime.default_ctor {
            if let Some(func) = module.get_function(&native.symbol) {
                engine.add_global_mapping(&func, native.entry as usize);
            }
        }
    }

    for (name, addr) in constants.host_bindings() {
        if let Some(global) = module.get_global(&name) {
            engine.add_global_mapping(&global, addr as usize);
        }
    }
}
