use std::borrow::Cow;
use std::fmt;

use smol_str::SmolStr;

/// The token a [`CompileError`] points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAt {
    /// The error was raised at the end of input.
    Eof,
    /// The error was raised at this lexeme.
    Lexeme(SmolStr),
    /// The error has no usable lexeme to point at, e.g. when the
    /// scanner produced an invalid token.
    Bare,
}

/// An error raised while compiling source code into a chunk.
///
/// Compilation does not stop at the first error; the driver collects
/// every error the parser managed to recover into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    line: u32,
    at: ErrorAt,
    message: Cow<'static, str>,
}

impl CompileError {
    pub fn new(line: u32, at: ErrorAt, message: impl Into<Cow<'static, str>>) -> CompileError {
        CompileError {
            line,
            at,
            message: message.into(),
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.at {
            ErrorAt::Eof => write!(f, " at end")?,
            ErrorAt::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            ErrorAt::Bare => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for CompileError {}
