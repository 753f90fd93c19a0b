//! Lexer: tokenizes source into a stream with precise spans.
//!
//! Operates over `Vec<char>` rather than raw bytes — only ASCII is
//! required and non-ASCII identifiers are unspecified, so a `char`-indexed
//! scan keeps line/column tracking simple without claiming full UTF-8
//! correctness it doesn't need.

use dex_core::{Diagnostic, DiagnosticKind, Location, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Var,
    Const,
    Expr,
    True,
    False,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Unsigned magnitude; the lexer never sees a sign (`-` is a separate
    /// `Minus` token). The parser combines a leading `-` with this
    /// magnitude so `i64::MIN` can be written at all.
    Int(u64),
    Float(f64),
    Str(String),
    Ident(String),
    Keyword(Keyword),

    // punctuation
    LParen,
    RParen,
    Comma,
    Colon,
    Semi,
    Assign,

    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Amp,
    Pipe,
    Caret,
    Bang,
    AmpAmp,
    PipePipe,
    Shl,
    Shrs,
    Shrz,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    /// Location of the character most recently consumed by `advance`, i.e.
    /// the position just before `line`/`column` were stepped forward. Spans
    /// are inclusive of both endpoints, so a token's end is always this —
    /// never `here()`, which already points past the last character.
    last: Location,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            last: Location::new(1, 1),
        }
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.column)
    }

    /// Location of the last character `advance` consumed — the inclusive
    /// end of whatever token is being built, valid any time after at least
    /// one `advance` call.
    fn last(&self) -> Location {
        self.last
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.last = self.here();
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn fatal(&self, begin: Location, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Syntax, Span::new(begin, self.here()), message)
    }

    fn skip_trivia(&mut self) -> Result<(), Diagnostic> {
        loop {
            match self.peek() {
                Some(c) if c.is_ascii_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.advance();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let begin = self.here();
                    self.advance();
                    self.advance();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            (None, _) => {
                                return Err(self.fatal(begin, "unterminated block comment"));
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token, Diagnostic> {
        let begin = self.here();
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.advance().unwrap());
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            text.push(self.advance().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.advance().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.pos;
            let mut exp = String::new();
            exp.push(self.advance().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp.push(self.advance().unwrap());
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    exp.push(self.advance().unwrap());
                }
                text.push_str(&exp);
            } else {
                self.pos = save;
            }
        }
        let end = self.last();
        let span = Span::new(begin, end);
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.fatal(begin, format!("invalid float literal '{text}'")))?;
            Ok(Token { kind: TokenKind::Float(value), span })
        } else {
            let value: u64 = text
                .parse()
                .map_err(|_| self.fatal(begin, format!("invalid integer literal '{text}'")))?;
            Ok(Token { kind: TokenKind::Int(value), span })
        }
    }

    fn lex_string(&mut self) -> Result<Token, Diagnostic> {
        let begin = self.here();
        self.advance(); // opening quote
        let mut out = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.fatal(begin, "unterminated string literal")),
                Some('"') => break,
                Some('\\') => {
                    let esc_begin = self.here();
                    match self.advance() {
                        Some('\\') => out.push('\\'),
                        Some('\'') => out.push('\''),
                        Some('"') => out.push('"'),
                        Some('?') => out.push('?'),
                        Some('a') => out.push('\u{7}'),
                        Some('b') => out.push('\u{8}'),
                        Some('f') => out.push('\u{c}'),
                        Some('n') => out.push('\n'),
                        Some('r') => out.push('\r'),
                        Some('t') => out.push('\t'),
                        Some('v') => out.push('\u{b}'),
                        Some(other) => {
                            return Err(self.fatal(esc_begin, format!("invalid escape sequence '\\{other}'")));
                        }
                        None => return Err(self.fatal(begin, "unterminated string literal")),
                    }
                }
                Some(c) => out.push(c),
            }
        }
        let span = Span::new(begin, self.last());
        Ok(Token { kind: TokenKind::Str(out), span })
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let begin = self.here();
        let mut text = String::new();
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            text.push(self.advance().unwrap());
        }
        let span = Span::new(begin, self.last());
        let kind = match text.as_str() {
            "var" => TokenKind::Keyword(Keyword::Var),
            "const" => TokenKind::Keyword(Keyword::Const),
            "expr" => TokenKind::Keyword(Keyword::Expr),
            "true" => TokenKind::Keyword(Keyword::True),
            "false" => TokenKind::Keyword(Keyword::False),
            "shl" => TokenKind::Shl,
            "shrs" => TokenKind::Shrs,
            "shrz" => TokenKind::Shrz,
            _ => TokenKind::Ident(text),
        };
        Token { kind, span }
    }

    /// Produce the next token, or a fatal diagnostic on malformed input.
    pub fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_trivia()?;
        let begin = self.here();
        let Some(c) = self.peek() else {
            return Ok(Token { kind: TokenKind::Eof, span: Span::point(begin) });
        };

        if c.is_ascii_digit() {
            return self.lex_number();
        }
        if c == '"' {
            return self.lex_string();
        }
        if is_ident_start(c) {
            return Ok(self.lex_ident_or_keyword());
        }

        macro_rules! one {
            ($kind:expr) => {{
                self.advance();
                Ok(Token { kind: $kind, span: Span::new(begin, self.last()) })
            }};
        }
        macro_rules! two {
            ($second:expr, $both:expr, $single:expr) => {{
                self.advance();
                if self.peek() == Some($second) {
                    self.advance();
                    Ok(Token { kind: $both, span: Span::new(begin, self.last()) })
                } else {
                    Ok(Token { kind: $single, span: Span::new(begin, self.last()) })
                }
            }};
        }

        match c {
            '(' => one!(TokenKind::LParen),
            ')' => one!(TokenKind::RParen),
            ',' => one!(TokenKind::Comma),
            ':' => one!(TokenKind::Colon),
            ';' => one!(TokenKind::Semi),
            '+' => one!(TokenKind::Plus),
            '-' => one!(TokenKind::Minus),
            '*' => one!(TokenKind::Star),
            '/' => one!(TokenKind::Slash),
            '%' => one!(TokenKind::Percent),
            '^' => one!(TokenKind::Caret),
            '=' => two!('=', TokenKind::EqEq, TokenKind::Assign),
            '!' => two!('=', TokenKind::NotEq, TokenKind::Bang),
            '<' => two!('=', TokenKind::Le, TokenKind::Lt),
            '>' => two!('=', TokenKind::Ge, TokenKind::Gt),
            '&' => two!('&', TokenKind::AmpAmp, TokenKind::Amp),
            '|' => two!('|', TokenKind::PipePipe, TokenKind::Pipe),
            other => Err(self.fatal(begin, format!("unexpected character '{other}'"))),
        }
    }

    /// Tokenize the whole input; stops (without error) at the first `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            out.push(tok);
            if is_eof {
                return Ok(out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn integer_vs_float_literal() {
        assert_eq!(kinds("42")[0], TokenKind::Int(42));
        assert_eq!(kinds("4.2")[0], TokenKind::Float(4.2));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1e3));
        assert_eq!(kinds("1")[0], TokenKind::Int(1));
    }

    #[test]
    fn string_escapes_decode() {
        assert_eq!(kinds(r#""a\nb""#)[0], TokenKind::Str("a\nb".to_string()));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Lexer::new("\"abc").tokenize();
        assert!(err.is_err());
    }

    #[test]
    fn unterminated_block_comment_is_fatal() {
        let err = Lexer::new("/* abc").tokenize();
        assert!(err.is_err());
    }

    #[test]
    fn keywords_recognized() {
        assert_eq!(kinds("var")[0], TokenKind::Keyword(Keyword::Var));
        assert_eq!(kinds("shl")[0], TokenKind::Shl);
    }

    #[test]
    fn line_comment_runs_to_eol() {
        let toks = kinds("1 // comment\n2");
        assert_eq!(toks[0], TokenKind::Int(1));
        assert_eq!(toks[1], TokenKind::Int(2));
    }

    #[test]
    fn token_spans_are_nonempty_and_monotonic() {
        let toks = Lexer::new("var x : Integer = 1 + 2 ;").tokenize().unwrap();
        let mut last_end = Location::new(1, 1);
        for t in &toks {
            if t.kind == TokenKind::Eof {
                continue;
            }
            assert!(t.span.begin <= t.span.end);
            assert!(t.span.begin >= last_end);
            last_end = t.span.end;
        }
    }
}
