//! Pretty-printer: renders an AST back to source syntax. Used to check
//! the parse round-trip property and to render folded programs in a
//! readable form — every `const_<Type>_l<line>_c<col>` constant name is
//! shortened to a sequential `[cN]` alias, assigned in the order each
//! name is first encountered while printing one declaration.

use dex_core::Literal;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{DeclKind, Node, NodeKind, Program, Slot};
use crate::types::TypeTable;

/// Render every definition in `program`, one per line, in source order.
pub fn print_program(program: &Program<'_>, types: &TypeTable) -> String {
    program
        .definitions
        .iter()
        .map(|def| print_definition(def, types))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a single top-level definition, e.g. `expr a: Integer = 1 + 2;`.
pub fn print_definition(def: &Node<'_>, types: &TypeTable) -> String {
    let NodeKind::Definition { name, decl_kind, declared_type, initializer } = &def.kind else {
        panic!("print_definition called on a non-definition node");
    };
    let mut aliases = HashMap::new();
    let kw = match decl_kind {
        DeclKind::Var => "var",
        DeclKind::Const => "const",
        DeclKind::Expr => "expr",
    };
    let ty_name = types.name_of(*declared_type);
    match initializer {
        Some(slot) => {
            let mut out = String::new();
            print_expr(slot.get(), types, &mut aliases, &mut out);
            format!("{kw} {name}: {ty_name} = {out};")
        }
        None => format!("{kw} {name}: {ty_name};"),
    }
}

fn next_alias(aliases: &mut HashMap<String, u32>, name: &str) -> String {
    let n = aliases.len() as u32 + 1;
    let id = *aliases.entry(name.to_string()).or_insert(n);
    format!("[c{id}]")
}

fn print_expr(node: &Node<'_>, types: &TypeTable, aliases: &mut HashMap<String, u32>, out: &mut String) {
    match &node.kind {
        NodeKind::Literal(lit) => print_literal(lit, out),
        NodeKind::Identifier { name, .. } => {
            out.push_str(name);
        }
        NodeKind::ConstRef { name } => {
            out.push_str(&next_alias(aliases, name));
        }
        NodeKind::Binary { op, lhs, rhs, .. } => {
            out.push('(');
            print_expr(lhs.get(), types, aliases, out);
            let _ = write!(out, " {} ", op.source_text());
            print_expr(rhs.get(), types, aliases, out);
            out.push(')');
        }
        NodeKind::Unary { op, operand, .. } => {
            out.push_str(op.source_text());
            print_expr(operand.get(), types, aliases, out);
        }
        NodeKind::Call { callee, args, .. } => {
            out.push_str(callee);
            out.push('(');
            print_call_args(args, types, aliases, out);
            out.push(')');
        }
        NodeKind::If { cond, then_branch, else_branch } => {
            out.push_str("if(");
            print_expr(cond.get(), types, aliases, out);
            out.push_str(", ");
            print_expr(then_branch.get(), types, aliases, out);
            out.push_str(", ");
            print_expr(else_branch.get(), types, aliases, out);
            out.push(')');
        }
        NodeKind::VarArg { elements, .. } => {
            print_call_args(elements, types, aliases, out);
        }
        NodeKind::Definition { .. } => {
            panic!("a definition node cannot appear inside an expression")
        }
    }
}

/// Prints a call's argument list, inlining a trailing `VarArg` node's own
/// elements as plain comma-separated arguments instead of one opaque
/// argument — the collapsed tail is an inference artifact, not source
/// syntax.
fn print_call_args(args: &[Slot<'_>], types: &TypeTable, aliases: &mut HashMap<String, u32>, out: &mut String) {
    let mut first = true;
    for a in args {
        let node = a.get();
        if let NodeKind::VarArg { elements, .. } = &node.kind {
            for e in elements {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                print_expr(e.get(), types, aliases, out);
            }
            continue;
        }
        if !first {
            out.push_str(", ");
        }
        first = false;
        print_expr(node, types, aliases, out);
    }
}

fn print_literal(lit: &Literal<'_>, out: &mut String) {
    match lit {
        Literal::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Literal::Int64(i) => {
            let _ = write!(out, "{i}");
        }
        Literal::Float64(f) => {
            let _ = write!(out, "{:?}", f);
        }
        Literal::StringRef(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    _ => out.push(c),
                }
            }
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompileEnv;
    use crate::builtins::BuiltinModule;
    use crate::registry::{register_all, Module};
    use crate::symbols::SymbolTable;

    fn parse_and_print(src: &str) -> String {
        let mut types = TypeTable::new();
        let mut functions = crate::functions::FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        let mut symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
        let env = CompileEnv::new(types.unresolved());
        let parser = crate::parser::Parser::new(src, &env, &types, &functions, &mut symbols).unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty(), "unexpected parse diagnostics: {diags}");
        print_program(&program, &types)
    }

    #[test]
    fn binary_expression_round_trips_fully_parenthesized() {
        let printed = parse_and_print("expr a: Integer = 1 + 2 * 3;");
        assert_eq!(printed, "expr a: Integer = (1 + (2 * 3));");
    }

    #[test]
    fn reprinting_the_printed_source_is_idempotent() {
        let once = parse_and_print("expr a: Integer = 1 + 2 * 3;");
        let twice = parse_and_print(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn if_expression_prints_as_a_call_like_form() {
        let printed = parse_and_print("expr a: Integer = if(true, 1, 2);");
        assert_eq!(printed, "expr a: Integer = if(true, 1, 2);");
    }
}
