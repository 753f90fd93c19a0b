//! Pratt precedence-climbing parser.
//!
//! Type and function names are resolved against the symbol table as they
//! are parsed, for better diagnostics; undefined names resolve to the
//! `Unresolved` sentinel and emit an accumulated (non-fatal) diagnostic.
//! Declarations add their own symbol to the table as soon as they are
//! parsed, so later declarations may reference earlier ones.

use dex_core::{Diagnostic, DiagnosticKind, DiagnosticSet, Literal, Location, Span};

use crate::ast::{BinOp, CompileEnv, DeclKind, Node, NodeKind, Program, Slot, UnOp};
use crate::functions::FunctionLibrary;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use crate::symbols::SymbolTable;
use crate::types::TypeTable;

pub struct Parser<'env> {
    tokens: Vec<Token>,
    pos: usize,
    env: &'env CompileEnv,
    types: &'env TypeTable,
    functions: &'env FunctionLibrary,
    symbols: &'env mut SymbolTable,
    diagnostics: DiagnosticSet,
}

/// Recoverable top-level declarations start with one of these keywords;
/// parse errors resynchronize by skipping to the next one.
fn starts_declaration(tok: &TokenKind) -> bool {
    matches!(
        tok,
        TokenKind::Keyword(Keyword::Var)
            | TokenKind::Keyword(Keyword::Const)
            | TokenKind::Keyword(Keyword::Expr)
    )
}

impl<'env> Parser<'env> {
    pub fn new(
        source: &str,
        env: &'env CompileEnv,
        types: &'env TypeTable,
        functions: &'env FunctionLibrary,
        symbols: &'env mut SymbolTable,
    ) -> Result<Self, Diagnostic> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser {
            tokens,
            pos: 0,
            env,
            types,
            functions,
            symbols,
            diagnostics: DiagnosticSet::new(),
        })
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn here(&self) -> Location {
        self.peek().span.begin
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, Diagnostic> {
        if self.peek_kind() == &kind {
            Ok(self.advance())
        } else {
            Err(Diagnostic::new(
                DiagnosticKind::Syntax,
                self.peek().span,
                format!("expected {what}, found {:?}", self.peek_kind()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), Diagnostic> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.advance().span;
                Ok((name, span))
            }
            other => Err(Diagnostic::new(
                DiagnosticKind::Syntax,
                self.peek().span,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    /// Parse the whole program: a sequence of declarations.
    pub fn parse(mut self) -> Result<(Program<'env>, DiagnosticSet), Diagnostic> {
        let mut definitions = Vec::new();
        while self.peek_kind() != &TokenKind::Eof {
            match self.parse_declaration() {
                Ok(def) => definitions.push(def),
                Err(diag) => {
                    self.diagnostics.push(diag);
                    self.synchronize();
                }
            }
        }
        Ok((Program { definitions }, self.diagnostics))
    }

    fn synchronize(&mut self) {
        while self.peek_kind() != &TokenKind::Eof && !starts_declaration(self.peek_kind()) {
            self.advance();
        }
    }

    fn parse_declaration(&mut self) -> Result<&'env Node<'env>, Diagnostic> {
        let begin = self.here();
        let decl_kind = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Var) => DeclKind::Var,
            TokenKind::Keyword(Keyword::Const) => DeclKind::Const,
            TokenKind::Keyword(Keyword::Expr) => DeclKind::Expr,
            other => {
                return Err(Diagnostic::new(
                    DiagnosticKind::Syntax,
                    self.peek().span,
                    format!("expected 'var', 'const' or 'expr', found {other:?}"),
                ));
            }
        };
        self.advance();
        let (name, name_span) = self.expect_ident()?;
        self.expect(TokenKind::Colon, "':'")?;
        let (type_name, type_span) = self.expect_ident()?;
        let declared_type = match self.types.lookup(&type_name) {
            Some(ty) => ty,
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::Name,
                    type_span,
                    format!("unknown type '{type_name}'"),
                ));
                self.types.unresolved()
            }
        };

        let initializer = if decl_kind == DeclKind::Var {
            None
        } else {
            self.expect(TokenKind::Assign, "'='")?;
            Some(Slot::new(self.parse_expr(0)?))
        };
        let end = if let Some(init) = &initializer {
            init.get().span.end
        } else {
            type_span.end
        };
        self.expect(TokenKind::Semi, "';'")?;

        let span = Span::new(begin, end);
        let node = self
            .env
            .alloc_node(span, NodeKind::Definition { name: name.clone(), decl_kind, declared_type, initializer });

        match self.symbols.declare(&name, declared_type, name_span) {
            Ok(_) => {}
            Err(diag) => self.diagnostics.push(diag),
        }
        Ok(node)
    }

    fn parse_expr(&mut self, min_prec: u8) -> Result<&'env Node<'env>, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        loop {
            let Some(op) = binop_from_token(self.peek_kind()) else {
                break;
            };
            if op.precedence() < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(op.precedence() + 1)?;
            let span = Span::combine(lhs.span, rhs.span);
            lhs = self.env.alloc_node(
                span,
                NodeKind::Binary { op, lhs: Slot::new(lhs), rhs: Slot::new(rhs), descriptor: std::cell::Cell::new(None) },
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<&'env Node<'env>, Diagnostic> {
        let begin = self.here();
        match self.peek_kind() {
            TokenKind::Minus => {
                self.advance();
                // A leading `-` directly on an integer literal is absorbed
                // into the literal so `i64::MIN` can parse.
                if let TokenKind::Int(magnitude) = *self.peek_kind() {
                    let lit_span = self.advance().span;
                    let span = Span::new(begin, lit_span.end);
                    let value = negate_u64(magnitude).ok_or_else(|| {
                        Diagnostic::new(
                            DiagnosticKind::Syntax,
                            span,
                            format!("integer literal -{magnitude} out of range for a 64-bit signed integer"),
                        )
                    })?;
                    return Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::Int64(value))));
                }
                let operand = self.parse_unary()?;
                let span = Span::new(begin, operand.span.end);
                Ok(self.env.alloc_node(
                    span,
                    NodeKind::Unary { op: UnOp::Neg, operand: Slot::new(operand), descriptor: std::cell::Cell::new(None) },
                ))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                let span = Span::new(begin, operand.span.end);
                Ok(self.env.alloc_node(
                    span,
                    NodeKind::Unary { op: UnOp::Not, operand: Slot::new(operand), descriptor: std::cell::Cell::new(None) },
                ))
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<&'env Node<'env>, Diagnostic> {
        let begin = self.here();
        match self.peek_kind().clone() {
            TokenKind::Int(magnitude) => {
                let span = self.advance().span;
                let value = i64::try_from(magnitude).map_err(|_| {
                    Diagnostic::new(
                        DiagnosticKind::Syntax,
                        span,
                        format!("integer literal {magnitude} out of range for a 64-bit signed integer"),
                    )
                })?;
                Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::Int64(value))))
            }
            TokenKind::Float(v) => {
                let span = self.advance().span;
                Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::Float64(v))))
            }
            TokenKind::Keyword(Keyword::True) => {
                let span = self.advance().span;
                Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::Bool(true))))
            }
            TokenKind::Keyword(Keyword::False) => {
                let span = self.advance().span;
                Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::Bool(false))))
            }
            TokenKind::Str(s) => {
                let span = self.advance().span;
                let interned = self.env.intern_str(&s);
                Ok(self.env.alloc_node(span, NodeKind::Literal(Literal::StringRef(interned))))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr(0)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                let name_span = self.advance().span;
                if self.peek_kind() == &TokenKind::LParen {
                    self.parse_call(name, name_span)
                } else {
                    self.resolve_identifier_use(&name, name_span);
                    let symbol = self.symbols.lookup(&name);
                    Ok(self.env.alloc_node(
                        name_span,
                        NodeKind::Identifier { name, symbol: std::cell::Cell::new(symbol) },
                    ))
                }
            }
            other => Err(Diagnostic::new(
                DiagnosticKind::Syntax,
                Span::point(begin),
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn resolve_identifier_use(&mut self, name: &str, span: Span) {
        if self.symbols.lookup(name).is_none() {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::Name,
                span,
                format!("undefined identifier '{name}'"),
            ));
        }
    }

    fn parse_call(&mut self, callee: String, callee_span: Span) -> Result<&'env Node<'env>, Diagnostic> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek_kind() != &TokenKind::RParen {
            loop {
                args.push(Slot::new(self.parse_expr(0)?));
                if self.peek_kind() == &TokenKind::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let end_span = self.expect(TokenKind::RParen, "')'")?.span;
        let span = Span::new(callee_span.begin, end_span.end);

        if callee == "if" {
            if args.len() != 3 {
                return Err(Diagnostic::new(
                    DiagnosticKind::Type,
                    span,
                    format!("'if' requires exactly 3 arguments, found {}", args.len()),
                ));
            }
            let mut it = args.into_iter();
            let cond = it.next().unwrap();
            let then_branch = it.next().unwrap();
            let else_branch = it.next().unwrap();
            return Ok(self
                .env
                .alloc_node(span, NodeKind::If { cond, then_branch, else_branch }));
        }

        if self.functions.overloads(&callee).next().is_none() && self.symbols.lookup(&callee).is_none() {
            self.diagnostics.push(Diagnostic::new(
                DiagnosticKind::Name,
                callee_span,
                format!("undefined function '{callee}'"),
            ));
        }
        Ok(self.env.alloc_node(
            span,
            NodeKind::Call { callee, args, descriptor: std::cell::Cell::new(None) },
        ))
    }
}

fn negate_u64(magnitude: u64) -> Option<i64> {
    if magnitude <= i64::MAX as u64 {
        Some(-(magnitude as i64))
    } else if magnitude == (i64::MAX as u64) + 1 {
        Some(i64::MIN)
    } else {
        None
    }
}

fn binop_from_token(tok: &TokenKind) -> Option<BinOp> {
    Some(match tok {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::NotEq => BinOp::Ne,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Le => BinOp::Le,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::Ge => BinOp::Ge,
        TokenKind::Amp => BinOp::BitAnd,
        TokenKind::Pipe => BinOp::BitOr,
        TokenKind::Caret => BinOp::BitXor,
        TokenKind::Shl => BinOp::Shl,
        TokenKind::Shrs => BinOp::Shrs,
        TokenKind::Shrz => BinOp::Shrz,
        TokenKind::AmpAmp => BinOp::And,
        TokenKind::PipePipe => BinOp::Or,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinModule;
    use crate::registry::{register_all, Module};

    fn setup() -> (TypeTable, FunctionLibrary, SymbolTable) {
        let mut types = TypeTable::new();
        let mut functions = FunctionLibrary::new();
        let builtin = BuiltinModule;
        register_all(&mut types, &mut functions, &[&builtin as &dyn Module]);
        let symbols = SymbolTable::seeded(&types, &functions, types.unresolved());
        (types, functions, symbols)
    }

    #[test]
    fn parses_simple_expr_declaration() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let parser = Parser::new("expr a: Integer = 1 + 2;", &env, &types, &functions, &mut symbols).unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty());
        assert_eq!(program.definitions.len(), 1);
    }

    #[test]
    fn duplicate_definition_is_single_diagnostic() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let parser = Parser::new(
            "expr x: Integer = 1; expr x: Integer = 2;",
            &env,
            &types,
            &functions,
            &mut symbols,
        )
        .unwrap();
        let (_program, diags) = parser.parse().unwrap();
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn min_i64_literal_parses() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let parser = Parser::new(
            "expr a: Integer = -9223372036854775808;",
            &env,
            &types,
            &functions,
            &mut symbols,
        )
        .unwrap();
        let (program, diags) = parser.parse().unwrap();
        assert!(diags.is_empty());
        let NodeKind::Definition { initializer: Some(init), .. } = &program.definitions[0].kind else {
            panic!("expected definition with initializer");
        };
        assert!(matches!(init.get().kind, NodeKind::Literal(Literal::Int64(i64::MIN))));
    }

    #[test]
    fn if_requires_three_args() {
        let (types, functions, mut symbols) = setup();
        let env = CompileEnv::new(types.unresolved());
        let parser = Parser::new(
            "expr a: Integer = if(true, 1);",
            &env,
            &types,
            &functions,
            &mut symbols,
        )
        .unwrap();
        let (_program, diags) = parser.parse().unwrap();
        assert_eq!(diags.len(), 1);
    }
}
