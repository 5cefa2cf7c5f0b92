pub use logos::Span;
use logos::{Lexer, Logos, Skip};

fn newline(lexer: &mut Lexer<TokenKind>) -> Skip {
    lexer.extras += 1;
    Skip
}

fn process_string(lexer: &mut Lexer<TokenKind>) -> Result<(), LexError> {
    // Strings may span lines, and the line counter has to follow them
    let slice = lexer.slice();
    lexer.extras += slice.matches('\n').count();

    // The permissive pattern runs to end of input when there is no closing quote
    if slice.len() >= 2 && slice.ends_with('"') {
        Ok(())
    } else {
        Err(LexError::UnterminatedString)
    }
}

const UNEXPECTED_CHARACTER: &str = "Unexpected character.";
const UNTERMINATED_STRING: &str = "Unterminated string.";

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexError {
    #[default]
    #[error("{}", UNEXPECTED_CHARACTER)]
    UnexpectedCharacter,
    #[error("{}", UNTERMINATED_STRING)]
    UnterminatedString,
}

impl LexError {
    /// The diagnostic text carried by error tokens.
    pub fn message(self) -> &'static str {
        match self {
            Self::UnexpectedCharacter => UNEXPECTED_CHARACTER,
            Self::UnterminatedString => UNTERMINATED_STRING,
        }
    }
}

/// Kinds of tokens. The lexer never produces [`TokenKind::Error`] or
/// [`TokenKind::Eof`] itself, [`Tokenizer`] synthesizes them.
///
/// Operators are not special here: `+`, `not=` and `<=` are all symbols, and the
/// compiler decides what they mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Logos)]
#[logos(extras = usize)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip r";[^\n]*")]
pub enum TokenKind {
    #[token("\n", newline)]
    LineEnding,
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[regex(r"-?[0-9]+")]
    Number,
    // A leading `-` only starts a symbol when no digit follows it
    #[regex(r#"[^ \t\r\n;()"0-9\-][^ \t\r\n;()"]*"#)]
    #[regex(r#"-([^ \t\r\n;()"0-9][^ \t\r\n;()"]*)?"#)]
    Symbol,
    #[regex(r#""[^"]*""#, process_string)]
    #[regex(r#""[^"]*"#, process_string)]
    String,
    Error,
    Eof,
}

/// A token is a view into the source it was scanned from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// The scanned text, or the message for [`TokenKind::Error`] tokens.
    pub lexeme: &'src str,
    pub span: Span,
    pub line: usize,
}

/// Scans tokens on demand, one per call.
pub struct Tokenizer<'src> {
    lexer: Lexer<'src, TokenKind>,
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str) -> Self {
        // Anything after a NUL is not part of the program
        let source = source.split('\0').next().unwrap_or_default();
        Self {
            lexer: TokenKind::lexer_with_extras(source, 1),
        }
    }

    /// Returns the next token, or [`TokenKind::Eof`] forever once the input
    /// is exhausted.
    pub fn next_token(&mut self) -> Token<'src> {
        match self.lexer.next() {
            Some(Ok(kind)) => Token {
                kind,
                lexeme: self.lexer.slice(),
                span: self.lexer.span(),
                line: self.lexer.extras,
            },
            Some(Err(err)) => Token {
                kind: TokenKind::Error,
                lexeme: err.message(),
                span: self.lexer.span(),
                line: self.lexer.extras,
            },
            None => {
                let end = self.lexer.source().len();
                Token {
                    kind: TokenKind::Eof,
                    lexeme: "",
                    span: end..end,
                    line: self.lexer.extras,
                }
            }
        }
    }
}

impl<'src> Iterator for Tokenizer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        (token.kind != TokenKind::Eof).then_some(token)
    }
}
