//! End-to-end coverage over the public API: parse -> infer -> fold ->
//! pretty-print, diagnostics, and overload resolution. Layout packing and
//! per-call destructor counts are covered by unit tests closer to their
//! implementations (`codegen::layout`, `codegen::expr`) since they need
//! white-box access to `ContextLayout`/generated IR text.
//!
//! Execution through the JIT-linked program (`backend::link` +
//! `exec_context::ExecutionContext`) is exercised by `dexc::compile`'s own
//! unit test (`well_typed_program_compiles_and_links`); inspecting a
//! returned `String`'s bytes from outside the crate would mean guessing at
//! an internal ABI this crate does not expose, so it is left there.

use dexc::ast::CompileEnv;
use dexc::builtins::BuiltinModule;
use dexc::fold::fold_program;
use dexc::functions::{FunctionDescriptor, FunctionFlags, FunctionLibrary, Param, WrapperFn};
use dexc::registry::{register_all, Module};
use dexc::symbols::SymbolTable;
use dexc::types::TypeTable;

fn seeded() -> (TypeTable, FunctionLibrary, CompileEnv) {
    let mut types = TypeTable::new();
    let mut functions = FunctionLibrary::new();
    let builtin = BuiltinModule;
    register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
    let env = CompileEnv::new(types.unresolved());
    (types, functions, env)
}

fn parse_infer_fold<'a>(
    env: &'a CompileEnv,
    types: &TypeTable,
    functions: &FunctionLibrary,
    src: &str,
) -> String {
    let mut symbols = SymbolTable::seeded(types, functions, types.unresolved());
    let parser = dexc::parser::Parser::new(src, env, types, functions, &mut symbols).unwrap();
    let (program, diags) = parser.parse().unwrap();
    assert!(diags.is_empty(), "unexpected parse diagnostics: {diags}");
    let infer_diags = dexc::infer::infer_program(env, &program, types, functions, &symbols);
    assert!(infer_diags.is_empty(), "unexpected inference diagnostics: {infer_diags}");
    fold_program(env, &program, types, functions, true).unwrap();
    dexc::pretty::print_program(&program, types)
}

#[test]
fn constant_arithmetic_folds_into_a_single_constant() {
    let (types, functions, env) = seeded();
    let printed = parse_infer_fold(&env, &types, &functions, "expr a: Integer = 1 + 2 + 4 + (2 * 1) + (1 + 0);");
    assert_eq!(printed, "expr a: Integer = [c1];");
}

extern "C" fn non_pure_int_add(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a + b };
}
extern "C" fn non_pure_int_mul(ret: *mut i64, a: i64, b: i64) {
    unsafe { *ret = a * b };
}
extern "C" fn non_pure_int_binop_wrapper(entry: *const (), args: *mut *mut u8) {
    unsafe {
        let f: extern "C" fn(*mut i64, i64, i64) = std::mem::transmute(entry);
        let a = *(*args.add(1) as *const i64);
        let b = *(*args.add(2) as *const i64);
        f(*args as *mut i64, a, b);
    }
}

/// Stands in for a host whose `*` overload has a side effect: registers the
/// same types as `BuiltinModule` but marks `operator_mul` impure, so folding
/// cannot assume it is safe to evaluate at compile time.
struct NonPureMulModule;

impl Module for NonPureMulModule {
    fn register_types(&self, registry: &mut dexc::registry::Registry) {
        BuiltinModule.register_types(registry);
    }

    fn register_functions(&self, registry: &mut dexc::registry::Registry) {
        let int_ty = registry.types.lookup("Integer").expect("Integer registered in register_types");
        let ii = vec![Param { ty: int_ty, variadic: false }, Param { ty: int_ty, variadic: false }];
        registry
            .register_function("operator_add", int_ty, ii.clone(), non_pure_int_add as *const (), non_pure_int_binop_wrapper, None, true)
            .unwrap();
        registry
            .register_function("operator_mul", int_ty, ii, non_pure_int_mul as *const (), non_pure_int_binop_wrapper, None, false)
            .unwrap();
    }
}

#[test]
fn constant_arithmetic_partial_folds_around_a_non_pure_multiply() {
    let mut types = TypeTable::new();
    let mut functions = FunctionLibrary::new();
    let module = NonPureMulModule;
    register_all(&mut types, &mut functions, &[&module as &dyn Module]);
    let env = CompileEnv::new(types.unresolved());

    let printed = parse_infer_fold(&env, &types, &functions, "expr a: Integer = 1 + 2 + 4 + (2 * 1) + (1 + 0);");
    // `2 * 1` cannot fold, but `1 + 2 + 4` and `1 + 0` each still do,
    // leaving the two-constant shape the impure multiply sits between.
    assert_eq!(printed, "expr a: Integer = (([c1] + (2 * 1)) + [c2]);");
}

#[test]
fn branch_with_literal_condition_prunes_to_the_taken_side() {
    let (types, functions, env) = seeded();
    let printed = parse_infer_fold(&env, &types, &functions, "expr a: Integer = if(true, (1+2)*3, 2+1);");
    // The `else` side (`2+1`) never gets folded or printed: the `If` node
    // is rewritten in place to its `then` branch as soon as folding sees
    // the literal `true` condition.
    assert_eq!(printed, "expr a: Integer = [c1];");
}

#[test]
fn duplicate_definition_reports_one_diagnostic_with_a_note_at_the_first() {
    let cfg = dexc::config::CompilerConfig::new();
    let result = dexc::compile("expr x: Integer = 1; expr x: Integer = 2;", &cfg, &[]);
    match result {
        dexc::CompileResult::Failure(diags) => {
            assert_eq!(diags.len(), 1);
            let text = diags.to_string();
            assert!(text.contains("Duplicate identifier 'x'"), "{text}");
            assert!(text.contains("note:"), "{text}");
        }
        dexc::CompileResult::Success { .. } => panic!("expected a duplicate-identifier failure"),
    }
}

#[test]
fn string_value_under_a_taken_branch_compiles_links_and_runs() {
    let cfg = dexc::config::CompilerConfig::new();
    let src = r#"expr a: String = if(1 < 2, substr(substr("Hello World!", 6, 5), 0, 1), "Another string");"#;
    let result = dexc::compile(src, &cfg, &[]);
    let dexc::CompileResult::Success { program, layout, entries, .. } = result else {
        panic!("expected a successful compile");
    };
    let entry = entries.iter().find(|e| e.name == "a").expect("declaration 'a' must have an entry");

    // `DexString`'s in-memory layout is private to `builtins.rs`; reading its
    // contents from outside the crate isn't possible without assuming an ABI
    // this crate doesn't expose, so this only checks that the getter runs to
    // completion (construct, call, destruct) without tripping up the unwind
    // bookkeeping, twice in a row, matching the "no leaks across repeated
    // calls" property.
    for _ in 0..2 {
        let ctx = dexc::exec_context::ExecutionContext::new(&program, &layout).unwrap();
        let addr = program.lookup(&entry.symbol).unwrap();
        let getter: unsafe extern "C" fn(*mut u8) -> *mut u8 = unsafe { std::mem::transmute(addr) };
        let value_ptr = unsafe { getter(ctx.as_ptr()) };
        assert!(!value_ptr.is_null());
    }
}

extern "C" fn noop_entry(_out: *mut i64, _a: i64, _b: i64) {}
extern "C" fn noop_wrapper(_entry: *const (), _args: *mut *mut u8) {}

fn max_descriptor(params: Vec<Param>, int_ty: dexc::types::TypeId) -> FunctionDescriptor {
    FunctionDescriptor {
        name: "max".to_string(),
        symbol: "max_test".to_string(),
        params,
        return_type: int_ty,
        entry: noop_entry as *const (),
        wrapper: noop_wrapper as WrapperFn,
        intrinsic: None,
        flags: FunctionFlags::default(),
    }
}

#[test]
fn overload_resolution_prefers_the_fixed_arity_match_over_variadic() {
    let mut types = TypeTable::new();
    let int_ty = types
        .register(dexc::types::TypeInfo {
            name: "Integer".to_string(),
            kind: dexc::types::TypeKind::Value,
            size: 8,
            align: 8,
            call_conv: dexc::types::CallConv::ByValue,
            lifetime: dexc::types::Lifetime::trivial(),
            lower: None,
        })
        .unwrap();

    let mut functions = FunctionLibrary::new();
    functions
        .register(max_descriptor(vec![Param { ty: int_ty, variadic: false }, Param { ty: int_ty, variadic: false }], int_ty))
        .unwrap();
    functions
        .register(max_descriptor(vec![Param { ty: int_ty, variadic: true }], int_ty))
        .unwrap();

    let fixed = functions.resolve("max", &[int_ty, int_ty], &types).unwrap();
    assert_eq!(functions.get(fixed).params.len(), 2);
    assert!(!functions.get(fixed).has_variadic_tail());

    let variadic_single = functions.resolve("max", &[int_ty], &types).unwrap();
    assert!(functions.get(variadic_single).has_variadic_tail());

    let variadic_triple = functions.resolve("max", &[int_ty, int_ty, int_ty], &types).unwrap();
    assert!(functions.get(variadic_triple).has_variadic_tail());
}
