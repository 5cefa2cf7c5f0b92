//! Compile bao source straight into bytecode, in a single pass
//! with no syntax tree in between.
//!
//! For example:
//!
//! ```text
//! (let x 5 (+ x 1))
//! ```
//!
//! compiles to
//!
//! ```text
//! CONSTANT 0 ; 5
//! GET_LOCAL 0
//! CONSTANT 1 ; 1
//! ADD
//! POP_UNDER
//! PRINT
//! RETURN
//! ```
//!
//! `x` is simply the value `5` left on the stack by its initializer. Reading it
//! copies the slot a known distance below the top (0 here, the top itself),
//! and leaving the body drops it from under the body's result.
//!
//! Every program is one expression, and its value is always printed.

pub mod bytecode;
pub mod scope;

use core::{fmt, str::FromStr};

use crate::{
    lexer::{Span, Token, TokenKind, Tokenizer},
    num,
    runtime::STACK_MAX,
    value::{Heap, Value},
};

use bytecode::{Chunk, OpCode};
use scope::{Scopes, TooManyBindings};

/// Most constants one chunk can address with a one-byte operand.
pub const MAX_CONSTANTS: usize = u8::MAX as usize + 1;

/// Where in the source an error was found, as shown in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// at the end of input
    End,
    /// at a token with this text
    At(Box<str>),
    /// errors from the lexer carry no location text
    Lexer,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::End => write!(f, " at end"),
            Location::At(lexeme) => write!(f, " at '{lexeme}'"),
            Location::Lexer => Ok(()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("{0}")]
    Lex(Box<str>),
    #[error("Unexpected token.")]
    UnexpectedToken,
    #[error("Too many constants in one chunk.")]
    TooManyConstants,
    #[error(transparent)]
    TooManyVariables(#[from] TooManyBindings),
    #[error("Unresolved variable.")]
    UnresolvedVariable,
    #[error("Cannot resolve operator.")]
    UnknownOperator,
    #[error("Expect ')'.")]
    ExpectRightParen,
    #[error("Expect end of expression.")]
    ExpectEnd,
    #[error("Stack overflow.")]
    StackOverflow,
}

/// The first error found while compiling a program.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("[line {line}] Error{location}: {kind}")]
pub struct CompileError {
    pub line: usize,
    pub location: Location,
    /// byte range of the offending token
    pub span: Span,
    pub kind: CompileErrorKind,
}

/// Forms a list can start with, looked up once from the head's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    Print,
    Let,
    Do,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown form")]
pub struct UnknownForm;

impl FromStr for Form {
    type Err = UnknownForm;

    fn from_str(spelling: &str) -> Result<Self, Self::Err> {
        Ok(match spelling {
            "not" => Form::Not,
            "+" => Form::Add,
            "-" => Form::Subtract,
            "*" => Form::Multiply,
            "/" => Form::Divide,
            "=" => Form::Equal,
            "not=" => Form::NotEqual,
            "<" => Form::Less,
            ">" => Form::Greater,
            "<=" => Form::LessEqual,
            ">=" => Form::GreaterEqual,
            "print" => Form::Print,
            "let" => Form::Let,
            "do" => Form::Do,
            _ => return Err(UnknownForm),
        })
    }
}

impl Form {
    /// The instruction for forms that take two operands and emit one instruction.
    fn binary_op(self) -> Option<OpCode> {
        Some(match self {
            Form::Add => OpCode::Add,
            Form::Multiply => OpCode::Multiply,
            Form::Divide => OpCode::Divide,
            Form::Equal => OpCode::Equal,
            Form::NotEqual => OpCode::NotEqual,
            Form::Less => OpCode::Less,
            Form::Greater => OpCode::Greater,
            Form::LessEqual => OpCode::LessEqual,
            Form::GreaterEqual => OpCode::GreaterEqual,
            _ => return None,
        })
    }
}

/// Compiles one program. String literals are allocated in `heap`, so the chunk
/// should only be run by the VM that owns it.
pub fn compile(source: &str, heap: &mut Heap) -> Result<Chunk, CompileError> {
    let mut compiler = Compiler::new(source, heap);
    compiler.advance();
    compiler.expression();
    compiler.consume(TokenKind::Eof, CompileErrorKind::ExpectEnd);
    compiler.finish()
}

struct Compiler<'src, 'h> {
    tokens: Tokenizer<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    chunk: Chunk,
    heap: &'h mut Heap,
    scopes: Scopes<'src>,
    // number of values the emitted code has on the stack at this point
    height: usize,
    overflow: Option<CompileError>,
    error: Option<CompileError>,
    suppressed: usize,
}

impl<'src, 'h> Compiler<'src, 'h> {
    fn new(source: &'src str, heap: &'h mut Heap) -> Self {
        let placeholder = Token {
            kind: TokenKind::Eof,
            lexeme: "",
            span: 0..0,
            line: 1,
        };
        Self {
            tokens: Tokenizer::new(source),
            current: placeholder.clone(),
            previous: placeholder,
            chunk: Chunk::new(),
            heap,
            scopes: Scopes::new(),
            height: 0,
            overflow: None,
            error: None,
            suppressed: 0,
        }
    }

    fn finish(mut self) -> Result<Chunk, CompileError> {
        self.emit(OpCode::Print);
        self.emit(OpCode::Return);

        if self.error.is_some() {
            // keep scanning so the whole input is consumed, without reporting more
            while self.current.kind != TokenKind::Eof {
                self.advance();
            }
            if self.suppressed > 0 {
                log::debug!("suppressed {} further compile error(s)", self.suppressed);
            }
        }

        if let Some(err) = self.error.or(self.overflow) {
            return Err(err);
        }

        log::debug!(
            "compiled {} bytes with {} constants",
            self.chunk.len(),
            self.chunk.constants().len()
        );
        log::trace!("{}", self.chunk.disassemble("code", self.heap));
        Ok(self.chunk)
    }

    fn make_error(token: &Token<'src>, kind: CompileErrorKind) -> CompileError {
        let location = match token.kind {
            TokenKind::Eof => Location::End,
            TokenKind::Error => Location::Lexer,
            _ => Location::At(Box::from(token.lexeme)),
        };
        CompileError {
            line: token.line,
            location,
            span: token.span.clone(),
            kind,
        }
    }

    fn error_at(&mut self, token: &Token<'src>, kind: CompileErrorKind) {
        if self.error.is_some() {
            self.suppressed += 1;
            return;
        }
        self.error = Some(Self::make_error(token, kind));
    }

    fn error(&mut self, kind: CompileErrorKind) {
        let token = self.previous.clone();
        self.error_at(&token, kind);
    }

    fn error_at_current(&mut self, kind: CompileErrorKind) {
        let token = self.current.clone();
        self.error_at(&token, kind);
    }

    fn advance(&mut self) {
        self.previous = self.current.clone();

        loop {
            self.current = self.tokens.next_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            let message = Box::from(self.current.lexeme);
            self.error_at_current(CompileErrorKind::Lex(message));
        }
    }

    fn consume(&mut self, kind: TokenKind, err: CompileErrorKind) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(err);
        }
    }

    fn emit(&mut self, op: OpCode) {
        self.chunk.write(op, self.previous.line);
        self.height = self.height.saturating_add_signed(op.stack_effect());
        if self.height > STACK_MAX && self.overflow.is_none() {
            self.overflow = Some(Self::make_error(
                &self.previous,
                CompileErrorKind::StackOverflow,
            ));
        }
    }

    fn emit_with_operand(&mut self, op: OpCode, operand: u8) {
        self.emit(op);
        self.chunk.write(operand, self.previous.line);
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.chunk.add_constant(value);
        let operand = match u8::try_from(idx) {
            Ok(operand) => operand,
            Err(_) => {
                self.error(CompileErrorKind::TooManyConstants);
                0
            }
        };
        self.emit_with_operand(OpCode::Constant, operand);
    }

    fn expression(&mut self) {
        if self.error.is_some() {
            return;
        }
        self.advance();
        match self.previous.kind {
            TokenKind::Number => self.number(),
            TokenKind::String => self.string(),
            TokenKind::Symbol => self.symbol(),
            TokenKind::LeftParen => self.list(),
            _ => self.error(CompileErrorKind::UnexpectedToken),
        }
    }

    fn number(&mut self) {
        let value = num::parse_literal(self.previous.lexeme);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let chars = lexeme
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(lexeme);
        let handle = self.heap.alloc_string(chars);
        self.emit_constant(Value::Obj(handle));
    }

    fn symbol(&mut self) {
        match self.previous.lexeme {
            "nil" => self.emit(OpCode::Nil),
            "true" => self.emit(OpCode::True),
            "false" => self.emit(OpCode::False),
            name => match self.scopes.resolve(name) {
                Some(binding) => {
                    // distance from the top of the stack, 0 being the top itself
                    let distance = self.height.saturating_sub(binding.slot + 1);
                    match u8::try_from(distance) {
                        Ok(distance) => self.emit_with_operand(OpCode::GetLocal, distance),
                        Err(_) => self.error(CompileErrorKind::StackOverflow),
                    }
                }
                None => self.error(CompileErrorKind::UnresolvedVariable),
            },
        }
    }

    fn list(&mut self) {
        self.advance();
        match self.previous.lexeme.parse::<Form>() {
            Ok(form) => self.form(form),
            Err(UnknownForm) => self.error(CompileErrorKind::UnknownOperator),
        }
        self.consume(TokenKind::RightParen, CompileErrorKind::ExpectRightParen);
    }

    fn form(&mut self, form: Form) {
        match form {
            Form::Not => {
                self.expression();
                self.emit(OpCode::Not);
            }
            Form::Subtract => {
                self.expression();
                if self.current.kind == TokenKind::RightParen {
                    self.emit(OpCode::Negate);
                } else {
                    self.expression();
                    self.emit(OpCode::Subtract);
                }
            }
            Form::Print => {
                self.expression();
                self.emit(OpCode::Print);
                // print is still an expression, and its value is nil
                self.emit(OpCode::Nil);
            }
            Form::Let => self.let_form(),
            Form::Do => {
                self.expression();
                self.emit(OpCode::Pop);
                self.expression();
            }
            binary => {
                self.expression();
                self.expression();
                if let Some(op) = binary.binary_op() {
                    self.emit(op);
                }
            }
        }
    }

    fn let_form(&mut self) {
        // any token can name a binding
        self.advance();
        let name = self.previous.clone();

        self.expression();

        self.scopes.begin();
        let slot = self.height.saturating_sub(1);
        if let Err(err) = self.scopes.define(name.lexeme, slot) {
            self.error_at(&name, err.into());
        }

        self.expression();

        for _ in 0..self.scopes.end() {
            self.emit(OpCode::PopUnder);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{compile, CompileError, CompileErrorKind, Form, Location, MAX_CONSTANTS};
    use crate::{
        compiler::{
            bytecode::{Chunk, OpCode},
            scope::MAX_BINDINGS,
        },
        value::{Heap, Value},
    };
    use assert2::{check, let_assert};

    fn compile_ok(source: &str) -> Chunk {
        let mut heap = Heap::new();
        let_assert!(Ok(chunk) = compile(source, &mut heap));
        chunk
    }

    fn compile_err(source: &str) -> CompileError {
        let mut heap = Heap::new();
        let_assert!(Err(err) = compile(source, &mut heap));
        err
    }

    fn ops(ops: &[OpCode]) -> Vec<u8> {
        ops.iter().map(|&op| u8::from(op)).collect()
    }

    #[test]
    fn form_spellings() {
        check!("not=".parse::<Form>() == Ok(Form::NotEqual));
        check!("let".parse::<Form>() == Ok(Form::Let));
        // spelling must match exactly
        check!("no".parse::<Form>().is_err());
        check!("lett".parse::<Form>().is_err());
    }

    #[test]
    fn literals() {
        use OpCode::*;
        check!(compile_ok("nil").code() == ops(&[Nil, Print, Return]));
        check!(compile_ok("true").code() == ops(&[True, Print, Return]));
        check!(compile_ok("false").code() == ops(&[False, Print, Return]));

        let chunk = compile_ok("-42");
        check!(chunk.code() == [u8::from(Constant), 0, u8::from(Print), u8::from(Return)]);
        check!(chunk.constants() == [Value::Number(-42)]);
    }

    #[test]
    fn string_literals_are_heap_objects() {
        let mut heap = Heap::new();
        let_assert!(Ok(chunk) = compile(r#""hi there""#, &mut heap));
        let_assert!([Value::Obj(handle)] = chunk.constants());
        check!(heap.get(*handle).and_then(|obj| obj.as_str()) == Some("hi there"));
    }

    #[test]
    fn arithmetic() {
        use OpCode::*;
        let chunk = compile_ok("(* (+ 1 2) 4)");
        let c = u8::from(Constant);
        check!(
            chunk.code()
                == [
                    c,
                    0,
                    c,
                    1,
                    u8::from(Add),
                    c,
                    2,
                    u8::from(Multiply),
                    u8::from(Print),
                    u8::from(Return)
                ]
        );
    }

    #[test]
    fn minus_is_negate_or_subtract() {
        let negate = compile_ok("(- 5)");
        check!(negate.code()[2] == u8::from(OpCode::Negate));
        let subtract = compile_ok("(- 5 3)");
        check!(subtract.code()[4] == u8::from(OpCode::Subtract));
    }

    #[test]
    fn print_leaves_nil() {
        use OpCode::*;
        check!(compile_ok("(print true)").code() == ops(&[True, Print, Nil, Print, Return]));
    }

    #[test]
    fn do_pops_the_first_value() {
        use OpCode::*;
        check!(compile_ok("(do nil true)").code() == ops(&[Nil, Pop, True, Print, Return]));
    }

    #[test]
    fn let_reads_relative_to_the_top() {
        let g = u8::from(OpCode::GetLocal);
        let chunk = compile_ok("(let x 5 (+ x 1))");
        check!(&chunk.code()[2..4] == [g, 0]);
        check!(chunk.code()[7] == u8::from(OpCode::PopUnder));

        // one temporary sits above `x` when it is read
        let chunk = compile_ok("(let x 5 (+ 1 x))");
        check!(&chunk.code()[4..6] == [g, 1]);

        // and the outer binding is further down
        let chunk = compile_ok("(let x 1 (let y 2 x))");
        check!(&chunk.code()[4..6] == [g, 1]);
        let pops = chunk
            .code()
            .iter()
            .filter(|&&b| b == u8::from(OpCode::PopUnder))
            .count();
        check!(pops == 2);
    }

    #[test]
    fn bindings_end_with_their_body() {
        let err = compile_err("(+ (let x 1 x) x)");
        check!(err.kind == CompileErrorKind::UnresolvedVariable);
        check!(err.location == Location::At(Box::from("x")));
        check!(err.to_string() == "[line 1] Error at 'x': Unresolved variable.");

        // not visible in its own initializer either
        let err = compile_err("(let x x 1)");
        check!(err.kind == CompileErrorKind::UnresolvedVariable);
    }

    #[test]
    fn diagnostics() {
        check!(compile_err("1 2").to_string() == "[line 1] Error at '2': Expect end of expression.");
        check!(compile_err("(+ 1 2").to_string() == "[line 1] Error at end: Expect ')'.");
        check!(compile_err("(+ 1 2 3)").to_string() == "[line 1] Error at '3': Expect ')'.");
        check!(compile_err(")").to_string() == "[line 1] Error at ')': Unexpected token.");
        check!(compile_err("").to_string() == "[line 1] Error at end: Unexpected token.");
        check!(compile_err("\n\"abc").to_string() == "[line 2] Error: Unterminated string.");
        check!(compile_err("(frob 1)").to_string() == "[line 1] Error at 'frob': Cannot resolve operator.");
    }

    #[test]
    fn only_the_first_error_is_reported() {
        let err = compile_err("(+ y 1) \"oops");
        check!(err.kind == CompileErrorKind::UnresolvedVariable);
        check!(err.span == (3..4));
    }

    #[test]
    fn too_many_constants() {
        let mut source = String::new();
        for n in 0..MAX_CONSTANTS {
            source.push_str(&format!("(do {n} "));
        }
        source.push_str("nil");
        source.push_str(&")".repeat(MAX_CONSTANTS));
        let chunk = compile_ok(&source);
        check!(chunk.constants().len() == MAX_CONSTANTS);

        let source = format!("(do 1 {source})");
        let err = compile_err(&source);
        check!(err.kind == CompileErrorKind::TooManyConstants);
    }

    #[test]
    fn too_many_variables() {
        let nested = |count: usize| {
            let mut source = "(let a nil ".repeat(count);
            source.push_str("nil");
            source.push_str(&")".repeat(count));
            source
        };
        let chunk = compile_ok(&nested(MAX_BINDINGS - 1));
        check!(chunk.constants().is_empty());

        // every binding fits, but the body's value no longer does
        let err = compile_err(&nested(MAX_BINDINGS));
        check!(err.kind == CompileErrorKind::StackOverflow);

        let err = compile_err(&nested(MAX_BINDINGS + 1));
        check!(err.to_string() == "[line 1] Error at 'a': Too many variables.");
    }

    #[test]
    fn deep_stacks_are_rejected() {
        // nil takes no constant slot, so the stack is the only limit hit
        let count = 300;
        let mut source = "(+ nil ".repeat(count);
        source.push_str("nil");
        source.push_str(&")".repeat(count));
        let err = compile_err(&source);
        check!(err.kind == CompileErrorKind::StackOverflow);
        check!(err.to_string() == "[line 1] Error at 'nil': Stack overflow.");
    }

    #[test]
    fn compiling_is_deterministic() {
        let source = r#"(let s "str" (do (print s) (= (* 2 3) (- 10 4))))"#;
        let (mut a, mut b) = (Heap::new(), Heap::new());
        let_assert!(Ok(first) = compile(source, &mut a));
        let_assert!(Ok(second) = compile(source, &mut b));
        check!(first == second);
        check!(first.disassemble("code", &a) == second.disassemble("code", &b));
    }
}
