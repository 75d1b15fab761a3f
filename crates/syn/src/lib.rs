use std::ops::Range;

use logos::Logos;

pub mod token;

#[cfg(test)]
mod test;

pub use token::TokenKind;

/// One scanned token: its kind tag, source text, byte span and 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Range<usize>,
    pub line: u32,
}

/// The main lexer used in basalt.
///
/// Wraps the generated tokenizer, tracks line numbers (including lines inside
/// multiline string literals), and keeps yielding an [`TokenKind::Eof`] token
/// once the input is exhausted so the parser never runs off the end.
pub struct Lexer<'src> {
    /// The actual lexer that does the job.
    inner: logos::Lexer<'src, TokenKind>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer from string.
    pub fn new(source: &'src str) -> Lexer<'src> {
        Lexer {
            inner: TokenKind::lexer(source),
        }
    }

    /// The underlying source code
    pub fn source(&self) -> &'src str {
        self.inner.source()
    }

    /// The line the lexer head is on
    pub fn line(&self) -> u32 {
        self.inner.extras.line
    }

    /// The next token, or an `Eof` token (forever) once input runs out.
    pub fn next_token(&mut self) -> Token<'src> {
        match self.next() {
            Some(tok) => tok,
            None => {
                let len = self.inner.source().len();
                Token {
                    kind: TokenKind::Eof,
                    text: "",
                    span: len..len,
                    line: self.inner.extras.line,
                }
            }
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = self.inner.next()?;
        let text = self.inner.slice();
        let line = self.inner.extras.line;
        // newlines inside string literals never reach the newline rule, so
        // the token keeps its starting line and the tally catches up here
        if matches!(kind, TokenKind::Str | TokenKind::UnterminatedStr) {
            let embedded = text.bytes().filter(|&b| b == b'\n').count();
            self.inner.extras.line += embedded as u32;
        }
        Some(Token {
            kind,
            text,
            span: self.inner.span(),
            line,
        })
    }
}
