//! Constant folding: replaces pure subtrees with precomputed constants owned
//! by the compiled program, for as long as it outlives code generation.
//!
//! Folding is always a fatal stage: a `const` declaration whose initializer
//! does not fully fold aborts the pipeline with a single `ConstError`
//! diagnostic, so this module returns `Result<_, Diagnostic>` rather than
//! accumulating into a `DiagnosticSet`.

use std::alloc::{alloc, dealloc, Layout};

use dex_core::{Diagnostic, DiagnosticKind, Literal, Span};

use crate::ast::{CompileEnv, DeclKind, NodeKind, Program, Slot};
use crate::functions::FunctionLibrary;
use crate::types::{DtorFn, NativeFn, TypeId, TypeTable};

/// One constant owned by the compiled program: raw bytes holding the
/// native in-memory representation of a value of type `ty`, plus the
/// destructor to run when the store itself is dropped (`Complex` results
/// only — `Value` results are trivially destructible).
pub struct ConstEntry {
    pub name: String,
    pub ty: TypeId,
    bytes: Box<[u8]>,
    dtor: Option<NativeFn<DtorFn>>,
}

impl ConstEntry {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Insertion-ordered `name -> ConstEntry` map. Outlives code generation;
/// the compiled program addresses entries by name (`Value` results as IR
/// constants, `Complex` results as externally-bound globals — see
/// `emit_globals`/`host_bindings`).
#[derive(Default)]
pub struct ConstantStore {
    entries: Vec<ConstEntry>,
}

impl ConstantStore {
    pub fn new() -> Self {
        ConstantStore::default()
    }

    pub fn get(&self, name: &str) -> Option<&ConstEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstEntry> {
        self.entries.iter()
    }

    fn insert(&mut self, entry: ConstEntry) {
        self.entries.push(entry);
    }

    /// Textual IR for every stored constant: `Value` entries as literal
    /// globals, `Complex` entries as externs the backend binds to this
    /// store's own storage via `host_bindings`.
    pub fn emit_globals(&self, types: &TypeTable) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let ir_ty = types.ir_type(entry.ty);
            if types.is_complex(entry.ty) {
                out.push_str(&format!("@{} = external global {}\n", entry.name, ir_ty));
            } else {
                out.push_str(&format!(
                    "@{} = private constant {} {}\n",
                    entry.name,
                    ir_ty,
                    format_value_literal(&ir_ty, &entry.bytes)
                ));
            }
        }
        out
    }

    /// `(symbol, address)` pairs the backend must bind as global mappings
    /// before JIT linking, one per `Complex` constant.
    pub fn host_bindings(&self) -> Vec<(String, *const u8)> {
        self.entries
            .iter()
            .filter(|e| e.dtor.is_some())
            .map(|e| (e.name.clone(), e.bytes.as_ptr()))
            .collect()
    }
}

impl Drop for ConstantStore {
    fn drop(&mut self) {
        for entry in &self.entries {
            if let Some(dtor) = &entry.dtor {
                (dtor.entry)(entry.bytes.as_ptr() as *mut u8);
            }
        }
    }
}

fn format_value_literal(ir_ty: &str, bytes: &[u8]) -> String {
    match ir_ty {
        "double" => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[..8]);
            format!("{:?}", f64::from_le_bytes(buf))
        }
        "i1" => {
            if bytes.first().copied().unwrap_or(0) != 0 {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        _ => {
            let mut buf = [0u8; 8];
            let n = bytes.len().min(8);
            buf[..n].copy_from_slice(&bytes[..n]);
            i64::from_le_bytes(buf).to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstError(pub Diagnostic);

/// Fold every definition's initializer in `program`. `fold_all` mirrors
/// the CLI's `--no-const-folding` inverse: when false, only `const`
/// declarations are attempted.
pub fn fold_program<'a>(
    env: &'a CompileEnv,
    program: &Program<'a>,
    types: &TypeTable,
    functions: &FunctionLibrary,
    fold_all: bool,
) -> Result<ConstantStore, ConstError> {
    let mut store = ConstantStore::new();
    for def in &program.definitions {
        let NodeKind::Definition { name, decl_kind, initializer, .. } = &def.kind else {
            continue;
        };
        let Some(slot) = initializer else { continue };
        if *decl_kind != DeclKind::Const && !fold_all {
            continue;
        }
        fold_slot(env, slot, types, functions, &mut store);
        if *decl_kind == DeclKind::Const && !matches!(slot.get().kind, NodeKind::ConstRef { .. }) {
            return Err(ConstError(Diagnostic::new(
                DiagnosticKind::Const,
                def.span,
                format!("right hand side of constant {name} is not a constant expression"),
            )));
        }
    }
    Ok(store)
}

/// Post-order fold of a single slot's subtree; rewrites the slot in place
/// when the node becomes foldable.
fn fold_slot<'a>(
    env: &'a CompileEnv,
    slot: &Slot<'a>,
    types: &TypeTable,
    functions: &FunctionLibrary,
    store: &mut ConstantStore,
) {
    let node = slot.get();
    match &node.kind {
        NodeKind::Literal(_) | NodeKind::Identifier { .. } | NodeKind::ConstRef { .. } => {}
        NodeKind::Binary { lhs, rhs, descriptor, .. } => {
            fold_slot(env, lhs, types, functions, store);
            fold_slot(env, rhs, types, functions, store);
            if let Some(id) = descriptor.get() {
                try_fold_call(env, slot, &[lhs, rhs], functions.get(id), node.span, types, store);
            }
        }
        NodeKind::Unary { operand, descriptor, .. } => {
            fold_slot(env, operand, types, functions, store);
            if let Some(id) = descriptor.get() {
                try_fold_call(env, slot, &[operand], functions.get(id), node.span, types, store);
            }
        }
        NodeKind::Call { args, descriptor, .. } => {
            for a in args {
                fold_slot(env, a, types, functions, store);
            }
            if let Some(id) = descriptor.get() {
                let arg_slots: Vec<&Slot<'a>> = args.iter().collect();
                try_fold_call(env, slot, &arg_slots, functions.get(id), node.span, types, store);
            }
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            fold_slot(env, cond, types, functions, store);
            fold_slot(env, then_branch, types, functions, store);
            fold_slot(env, else_branch, types, functions, store);
            if let NodeKind::Literal(Literal::Bool(b)) = cond.get().kind {
                slot.set(if b { then_branch.get() } else { else_branch.get() });
            }
        }
        NodeKind::VarArg { elements, .. } => {
            for e in elements {
                fold_slot(env, e, types, functions, store);
            }
            if elements.iter().all(|e| is_foldable_leaf(e.get())) {
                if let Some(name) = fold_vararg(node, elements, types, store) {
                    slot.set(env.alloc_node(node.span, NodeKind::ConstRef { name }));
                }
            }
        }
        NodeKind::Definition { .. } => {}
    }
}

fn is_foldable_leaf(node: &crate::ast::Node<'_>) -> bool {
    match &node.kind {
        NodeKind::ConstRef { .. } => true,
        NodeKind::Literal(lit) => !matches!(lit, Literal::StringRef(_)),
        _ => false,
    }
}

/// If `desc` is pure and every argument slot is a foldable leaf, evaluate
/// the call through its type-erased wrapper and repoint `slot` at a fresh
/// `ConstRef` naming the result's entry in `store`.
fn try_fold_call<'a>(
    env: &'a CompileEnv,
    slot: &Slot<'a>,
    arg_slots: &[&Slot<'a>],
    desc: &crate::functions::FunctionDescriptor,
    span: Span,
    types: &TypeTable,
    store: &mut ConstantStore,
) {
    if !desc.is_pure() {
        return;
    }
    if !arg_slots.iter().all(|s| is_foldable_leaf(s.get())) {
        return;
    }
    let mut arg_bufs: Vec<Vec<u8>> = Vec::with_capacity(arg_slots.len());
    for s in arg_slots {
        match leaf_bytes(s.get(), types, store) {
            Some(b) => arg_bufs.push(b),
            None => return,
        }
    }

    let ret_info = types.get(desc.return_type);
    let layout = match Layout::from_size_align(ret_info.size.max(1) as usize, ret_info.align.max(1) as usize) {
        Ok(l) => l,
        Err(_) => return,
    };
    let out_ptr = unsafe { alloc(layout) };
    if out_ptr.is_null() {
        return;
    }

    let mut arg_ptrs: Vec<*mut u8> = Vec::with_capacity(arg_bufs.len() + 1);
    arg_ptrs.push(out_ptr);
    for buf in &mut arg_bufs {
        arg_ptrs.push(buf.as_mut_ptr());
    }

    unsafe {
        (desc.wrapper)(desc.entry, arg_ptrs.as_mut_ptr());
    }

    let out_bytes = unsafe { std::slice::from_raw_parts(out_ptr, ret_info.size as usize) }.to_vec();
    unsafe { dealloc(out_ptr, layout) };

    let name = format!(
        "const_{}_l{}_c{}",
        types.name_of(desc.return_type),
        span.begin.line,
        span.begin.column
    );
    let dtor = if types.is_complex(desc.return_type) {
        ret_info.lifetime.destructor.clone()
    } else {
        None
    };
    store.insert(ConstEntry {
        name: name.clone(),
        ty: desc.return_type,
        bytes: out_bytes.into_boxed_slice(),
        dtor,
    });
    slot.set(env.alloc_node(span, NodeKind::ConstRef { name }));
}

fn leaf_bytes(node: &crate::ast::Node<'_>, types: &TypeTable, store: &ConstantStore) -> Option<Vec<u8>> {
    match &node.kind {
        NodeKind::ConstRef { name } => store.get(name).map(|e| e.bytes().to_vec()),
        NodeKind::Literal(Literal::Int64(i)) => Some(i.to_le_bytes().to_vec()),
        NodeKind::Literal(Literal::Float64(f)) => Some(f.to_le_bytes().to_vec()),
        NodeKind::Literal(Literal::Bool(b)) => Some(vec![*b as u8]),
        NodeKind::Literal(Literal::StringRef(_)) => None,
        _ => {
            let _ = types;
            None
        }
    }
}

/// Fold a saturated `VarArg` whose elements are all already foldable
/// leaves into a single constant: header `{ptr, count}` at offset zero
/// followed by a packed element array.
fn fold_vararg(
    node: &crate::ast::Node<'_>,
    elements: &[Slot<'_>],
    types: &TypeTable,
    store: &mut ConstantStore,
) -> Option<String> {
    let NodeKind::VarArg { elem_type, .. } = &node.kind else { return None };
    let elem_info = types.get(*elem_type);
    let elem_size = elem_info.size.max(1) as usize;
    let mut array = Vec::with_capacity(elem_size * elements.len());
    for e in elements {
        array.extend(leaf_bytes(e.get(), types, store)?);
    }
    let name = format!(
        "const_VarArg_{}_l{}_c{}",
        types.name_of(*elem_type),
        node.span.begin.line,
        node.span.begin.column
    );
    store.insert(ConstEntry {
        name: name.clone(),
        ty: *elem_type,
        bytes: array.into_boxed_slice(),
        dtor: None,
    });
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinModule;
    use crate::registry::{register_all, Module};
    use crate::symbols::SymbolTable;

    struct Fixture {
        env: CompileEnv,
        types: TypeTable,
        functions: FunctionLibrary,
    }

    fn fixture() -> Fixture {
        let mut types = TypeTable::new();
        let mut functions = FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        let env = CompileEnv::new(types.unresolved());
        Fixture { env, types, functions }
    }

    fn parse_and_infer<'a>(fx: &'a Fixture, src: &str) -> Program<'a> {
        let mut symbols = SymbolTable::seeded(&fx.types, &fx.functions, fx.types.unresolved());
        let parser = crate::parser::Parser::new(src, &fx.env, &fx.types, &fx.functions, &mut symbols).unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags}");
        let infer_diags = crate::infer::infer_program(&fx.env, &program, &fx.types, &fx.functions, &symbols);
        assert!(infer_diags.is_empty(), "unexpected inference diagnostics: {infer_diags}");
        program
    }

    #[test]
    fn constant_arithmetic_folds_to_a_single_constant_when_every_operator_is_pure() {
        let fx = fixture();
        let program = parse_and_infer(&fx, "const x: Integer = 1 + 2 + 4 + (2 * 1) + (1 + 0);");
        let store = fold_program(&fx.env, &program, &fx.types, &fx.functions, true).unwrap();

        let def = program.definitions[0];
        let NodeKind::Definition { initializer: Some(slot), .. } = &def.kind else {
            panic!("expected a definition with an initializer");
        };
        // The builtin `*` is registered pure, so it folds to a literal
        // product like everything else here and the whole expression
        // collapses to a single constant.
        let NodeKind::ConstRef { name } = &slot.get().kind else {
            panic!("expected the initializer to fold to a single ConstRef");
        };
        let entry = store.get(name).expect("folded constant must be in the store");
        let value = i64::from_le_bytes(entry.bytes().try_into().unwrap());
        assert_eq!(value, 1 + 2 + 4 + (2 * 1) + (1 + 0));
    }

    /// A host module whose `*` is registered impure, standing in for a
    /// side-effecting overload a real host might provide. Used only to
    /// exercise the partial-fold path: the production `BuiltinModule`
    /// marks every operator pure, so nothing in it can ever leave a
    /// subtree unfolded.
    struct NonPureMulModule;

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

    impl Module for NonPureMulModule {
        fn register_types(&self, registry: &mut crate::registry::Registry) {
            BuiltinModule.register_types(registry);
        }

        fn register_functions(&self, registry: &mut crate::registry::Registry) {
            let int_ty = registry.types.lookup("Integer").expect("Integer registered in register_types");
            let ii = vec![crate::functions::Param { ty: int_ty, variadic: false }, crate::functions::Param { ty: int_ty, variadic: false }];
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
        let fx = Fixture { env, types, functions };

        let program = parse_and_infer(&fx, "expr x: Integer = 1 + 2 + 4 + (2 * 1) + (1 + 0);");
        let store = fold_program(&fx.env, &program, &fx.types, &fx.functions, true).unwrap();
        let printed = crate::pretty::print_program(&program, &fx.types);

        // `2 * 1` is impure and stays a live `Binary` node; its pure
        // neighbors each still fold to their own constant around it,
        // matching the documented two-constant partial fold.
        assert_eq!(printed, "expr x: Integer = (([c1] + (2 * 1)) + [c2]);");
        assert_eq!(store.iter().count(), 2);

        let def = program.definitions[0];
        let NodeKind::Definition { initializer: Some(slot), .. } = &def.kind else {
            panic!("expected a definition with an initializer");
        };
        let NodeKind::Binary { lhs, rhs, .. } = &slot.get().kind else {
            panic!("expected the top-level node to stay a live Binary");
        };
        assert!(matches!(rhs.get().kind, NodeKind::ConstRef { .. }));
        let NodeKind::Binary { lhs: c1, rhs: mul, .. } = &lhs.get().kind else {
            panic!("expected the left side to stay a live Binary");
        };
        assert!(matches!(c1.get().kind, NodeKind::ConstRef { .. }));
        assert!(matches!(mul.get().kind, NodeKind::Binary { .. }));
    }

    #[test]
    fn const_decl_with_non_foldable_rhs_is_fatal() {
        let fx = fixture();
        let program = parse_and_infer(&fx, "var y: Integer; const x: Integer = y;");
        let err = fold_program(&fx.env, &program, &fx.types, &fx.functions, true).unwrap_err();
        assert_eq!(err.0.kind, DiagnosticKind::Const);
    }
}
