//! Type inference: bottom-up (post-order) type propagation over the parsed
//! AST. Resolves operators and calls against the function library, checks
//! `if` shape, validates declaration annotations, and collapses saturated
//! variadic call tails into `VarArg` nodes.
//!
//! Diagnostics accumulate rather than abort: once a node's own type can't
//! be determined it is stamped `Unresolved` and its ancestors simply skip
//! emitting their own error for that reason (follow-up suppression) rather
//! than cascading.

use std::cell::Cell;

use dex_core::{Diagnostic, DiagnosticKind, DiagnosticSet, Literal, Span};

use crate::ast::{CompileEnv, NodeKind, Program, Slot};
use crate::functions::FunctionLibrary;
use crate::symbols::SymbolTable;
use crate::types::{TypeId, TypeTable};

/// Infer every declaration's initializer in `program`, returning whatever
/// diagnostics accumulated along the way.
pub fn infer_program<'a>(
    env: &'a CompileEnv,
    program: &Program<'a>,
    types: &TypeTable,
    functions: &FunctionLibrary,
    symbols: &SymbolTable,
) -> DiagnosticSet {
    let mut diags = DiagnosticSet::new();
    for def in &program.definitions {
        let NodeKind::Definition { declared_type, initializer, .. } = &def.kind else {
            continue;
        };
        let Some(slot) = initializer else { continue };
        infer_slot(env, slot, types, functions, symbols, &mut diags);
        let init_ty = slot.get().result_type.get();
        if *declared_type != types.unresolved()
            && init_ty != types.unresolved()
            && init_ty != *declared_type
        {
            diags.push(Diagnostic::new(
                DiagnosticKind::Type,
                def.span,
                format!(
                    "declared type '{}' does not match initializer type '{}'",
                    types.name_of(*declared_type),
                    types.name_of(init_ty)
                ),
            ));
        }
    }
    diags
}

fn literal_type(lit: &Literal<'_>, types: &TypeTable, span: Span, diags: &mut DiagnosticSet) -> TypeId {
    let name = match lit {
        Literal::Bool(_) => "Bool",
        Literal::Int64(_) => "Integer",
        Literal::Float64(_) => "Float",
        Literal::StringRef(_) => "String",
    };
    match types.lookup(name) {
        Some(ty) => ty,
        None => {
            diags.push(Diagnostic::new(
                DiagnosticKind::Internal,
                span,
                format!("builtin type '{name}' is not registered"),
            ));
            types.unresolved()
        }
    }
}

/// Infer a single expression slot's subtree, in place. May repoint `slot`
/// at a freshly allocated node (variadic-tail collapsing only); always
/// leaves `slot.get().result_type` set on return.
fn infer_slot<'a>(
    env: &'a CompileEnv,
    slot: &Slot<'a>,
    types: &TypeTable,
    functions: &FunctionLibrary,
    symbols: &SymbolTable,
    diags: &mut DiagnosticSet,
) {
    let node = slot.get();
    match &node.kind {
        NodeKind::Literal(lit) => {
            node.result_type.set(literal_type(lit, types, node.span, diags));
        }
        NodeKind::Identifier { symbol, .. } => {
            let ty = match symbol.get() {
                Some(id) => symbols.get(id).ty,
                None => types.unresolved(),
            };
            node.result_type.set(ty);
        }
        NodeKind::Binary { op, lhs, rhs, descriptor } => {
            infer_slot(env, lhs, types, functions, symbols, diags);
            infer_slot(env, rhs, types, functions, symbols, diags);
            let lty = lhs.get().result_type.get();
            let rty = rhs.get().result_type.get();
            if lty == types.unresolved() || rty == types.unresolved() {
                node.result_type.set(types.unresolved());
                return;
            }
            match functions.resolve(op.canonical_name(), &[lty, rty], types) {
                Ok(id) => {
                    descriptor.set(Some(id));
                    node.result_type.set(functions.get(id).return_type);
                }
                Err(e) => {
                    diags.push(Diagnostic::new(DiagnosticKind::Type, node.span, e.0));
                    node.result_type.set(types.unresolved());
                }
            }
        }
        NodeKind::Unary { op, operand, descriptor } => {
            infer_slot(env, operand, types, functions, symbols, diags);
            let ty = operand.get().result_type.get();
            if ty == types.unresolved() {
                node.result_type.set(types.unresolved());
                return;
            }
            match functions.resolve(op.canonical_name(), &[ty], types) {
                Ok(id) => {
                    descriptor.set(Some(id));
                    node.result_type.set(functions.get(id).return_type);
                }
                Err(e) => {
                    diags.push(Diagnostic::new(DiagnosticKind::Type, node.span, e.0));
                    node.result_type.set(types.unresolved());
                }
            }
        }
        NodeKind::Call { callee, args, descriptor } => {
            for a in args {
                infer_slot(env, a, types, functions, symbols, diags);
            }
            let arg_types: Vec<TypeId> = args.iter().map(|a| a.get().result_type.get()).collect();
            if arg_types.iter().any(|t| *t == types.unresolved()) {
                node.result_type.set(types.unresolved());
                return;
            }
            match functions.resolve(callee, &arg_types, types) {
                Ok(id) => {
                    descriptor.set(Some(id));
                    let desc = functions.get(id);
                    node.result_type.set(desc.return_type);
                    if desc.has_variadic_tail() {
                        let fixed_count = desc.params.len() - 1;
                        if args.len() > fixed_count + 1 {
                            collapse_variadic_tail(env, slot, callee, args, fixed_count, id, desc.return_type);
                        }
                    }
                }
                Err(e) => {
                    diags.push(Diagnostic::new(DiagnosticKind::Type, node.span, e.0));
                    node.result_type.set(types.unresolved());
                }
            }
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            infer_slot(env, cond, types, functions, symbols, diags);
            infer_slot(env, then_branch, types, functions, symbols, diags);
            infer_slot(env, else_branch, types, functions, symbols, diags);
            let cty = cond.get().result_type.get();
            let tty = then_branch.get().result_type.get();
            let ety = else_branch.get().result_type.get();
            if cty == types.unresolved() || tty == types.unresolved() || ety == types.unresolved() {
                node.result_type.set(types.unresolved());
                return;
            }
            let bool_ty = match types.lookup("Bool") {
                Some(ty) => ty,
                None => {
                    diags.push(Diagnostic::new(
                        DiagnosticKind::Internal,
                        node.span,
                        "builtin type 'Bool' is not registered",
                    ));
                    node.result_type.set(types.unresolved());
                    return;
                }
            };
            if cty != bool_ty {
                diags.push(Diagnostic::new(
                    DiagnosticKind::Type,
                    cond.get().span,
                    format!("'if' condition must be Bool, found '{}'", types.name_of(cty)),
                ));
                node.result_type.set(types.unresolved());
                return;
            }
            if tty != ety {
                diags.push(Diagnostic::new(
                    DiagnosticKind::Type,
                    node.span,
                    format!(
                        "'if' branches must have identical type, found '{}' and '{}'",
                        types.name_of(tty),
                        types.name_of(ety)
                    ),
                ));
                node.result_type.set(types.unresolved());
                return;
            }
            node.result_type.set(tty);
        }
        NodeKind::VarArg { .. } | NodeKind::ConstRef { .. } | NodeKind::Definition { .. } => {}
    }
}

/// Replace a saturated call's variadic tail (two or more trailing positional
/// arguments) with a single `VarArg` node, and the call itself with a new
/// node carrying the shortened argument list. `slot` is repointed at the
/// replacement; the original node is left as unreachable arena garbage.
#[allow(clippy::too_many_arguments)]
fn collapse_variadic_tail<'a>(
    env: &'a CompileEnv,
    slot: &Slot<'a>,
    callee: &str,
    args: &[Slot<'a>],
    fixed_count: usize,
    id: crate::functions::FuncId,
    return_type: TypeId,
) {
    let tail = &args[fixed_count..];
    let tail_span = tail
        .iter()
        .map(|s| s.get().span)
        .reduce(Span::combine)
        .expect("variadic tail has at least two elements");
    let elem_type = tail[0].get().result_type.get();
    let elements: Vec<Slot<'a>> = tail.iter().map(|s| Slot::new(s.get())).collect();
    let vararg = env.alloc_node(tail_span, NodeKind::VarArg { elem_type, elements });
    vararg.result_type.set(elem_type);

    let mut new_args: Vec<Slot<'a>> = args[..fixed_count].iter().map(|s| Slot::new(s.get())).collect();
    new_args.push(Slot::new(vararg));

    let node = slot.get();
    let new_call = env.alloc_node(
        node.span,
        NodeKind::Call {
            callee: callee.to_string(),
            args: new_args,
            descriptor: Cell::new(Some(id)),
        },
    );
    new_call.result_type.set(return_type);
    slot.set(new_call);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::DeclKind;
    use crate::builtins::BuiltinModule;
    use crate::registry::{register_all, Module};
    use crate::types::TypeTable;

    fn setup() -> (TypeTable, FunctionLibrary, SymbolTable) {
        let mut types = TypeTable::new();
        let mut functions = FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        let symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
        (types, functions, symbols)
    }

    fn parse<'a>(
        env: &'a CompileEnv,
        src: &str,
        types: &'a TypeTable,
        functions: &'a FunctionLibrary,
        symbols: &'a mut SymbolTable,
    ) -> Program<'a> {
        let parser = crate::parser::Parser::new(src, env, types, functions, symbols).unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags}");
        program
    }

    #[test]
    fn binary_arithmetic_resolves_to_integer() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let program = parse(&env, "expr a: Integer = 1 + 2 * 3;", &types, &functions, &mut symbols);
        let diags = infer_program(&env, &program, &types, &functions, &symbols);
        assert!(diags.is_empty(), "{diags}");
        let NodeKind::Definition { initializer: Some(init), .. } = &program.definitions[0].kind else {
            panic!("expected definition");
        };
        let int_ty = types.lookup("Integer").unwrap();
        assert_eq!(init.get().result_type.get(), int_ty);
    }

    #[test]
    fn if_requires_bool_condition() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let program = parse(&env, "expr a: Integer = if(1, 2, 3);", &types, &functions, &mut symbols);
        let diags = infer_program(&env, &program, &types, &functions, &symbols);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.iter().next().unwrap().kind, DiagnosticKind::Type);
    }

    #[test]
    fn if_branches_must_match() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let program = parse(
            &env,
            "expr a: Integer = if(true, 1, 2.0);",
            &types,
            &functions,
            &mut symbols,
        );
        let diags = infer_program(&env, &program, &types, &functions, &symbols);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn declared_type_mismatch_is_reported() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let program = parse(&env, "expr a: Bool = 1 + 2;", &types, &functions, &mut symbols);
        let diags = infer_program(&env, &program, &types, &functions, &symbols);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn variadic_call_with_one_tail_arg_is_not_collapsed() {
        let (mut types, mut functions, mut symbols) = setup();
        register_variadic_max(&mut types, &mut functions);
        symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
        let env = CompileEnv::new(types.unresolved());
        let program = parse(&env, "expr a: Integer = max(1);", &types, &functions, &mut symbols);
        infer_program(&env, &program, &types, &functions, &symbols);
        let NodeKind::Definition { initializer: Some(init), .. } = &program.definitions[0].kind else {
            panic!("expected definition");
        };
        let NodeKind::Call { args, .. } = &init.get().kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert!(!matches!(args[0].get().kind, NodeKind::VarArg { .. }));
    }

    #[test]
    fn variadic_call_with_three_tail_args_collapses_to_vararg() {
        let (mut types, mut functions, mut symbols) = setup();
        register_variadic_max(&mut types, &mut functions);
        symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
        let env = CompileEnv::new(types.unresolved());
        let program = parse(
            &env,
            "expr a: Integer = max(1, 2, 3);",
            &types,
            &functions,
            &mut symbols,
        );
        infer_program(&env, &program, &types, &functions, &symbols);
        let NodeKind::Definition { initializer: Some(init), .. } = &program.definitions[0].kind else {
            panic!("expected definition");
        };
        let NodeKind::Call { args, .. } = &init.get().kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        let NodeKind::VarArg { elements, .. } = &args[0].get().kind else {
            panic!("expected collapsed VarArg argument");
        };
        assert_eq!(elements.len(), 3);
    }

    /// Registers a second, purely test-local `max(...Integer) -> Integer`
    /// overload alongside the builtin module's operators, mirroring scenario
    /// 6 of the end-to-end testable properties.
    fn register_variadic_max(types: &mut TypeTable, functions: &mut FunctionLibrary) {
        use crate::functions::{FunctionDescriptor, FunctionFlags, Param};

        extern "C" fn max_entry(_out: *mut i64, _first: i64) {}
        extern "C" fn max_wrapper(_entry: *const (), _args: *mut *mut u8) {}

        let int_ty = types.lookup("Integer").unwrap();
        functions
            .register(FunctionDescriptor {
                name: "max".to_string(),
                symbol: "_max_vararg_Integer".to_string(),
                params: vec![Param { ty: int_ty, variadic: true }],
                return_type: int_ty,
                entry: max_entry as *const (),
                wrapper: max_wrapper,
                intrinsic: None,
                flags: FunctionFlags { pure_: true },
            })
            .unwrap();
    }
}
