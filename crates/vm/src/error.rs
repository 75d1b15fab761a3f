use std::fmt;

use itertools::Itertools;
use smol_str::SmolStr;

use basalt_codegen::CompileError;

/// One call site in a [`RuntimeError`]'s trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    /// Source line of the instruction that was executing in this frame.
    pub line: u32,
    /// Name of the function, or `None` for the top-level script.
    pub name: Option<SmolStr>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// An error raised while a program was executing. Carries the call trace at
/// the point of failure, innermost frame first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    message: String,
    trace: Vec<TraceLine>,
}

impl RuntimeError {
    pub(crate) fn new(message: impl Into<String>, trace: Vec<TraceLine>) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            trace,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Line of the failing instruction, from the innermost frame.
    pub fn line(&self) -> Option<u32> {
        self.trace.first().map(|t| t.line)
    }

    pub fn trace(&self) -> &[TraceLine] {
        &self.trace
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.trace.is_empty() {
            write!(f, "\n{}", self.trace.iter().format("\n"))?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// Why a source string failed to run.
#[derive(Debug)]
pub enum InterpretError {
    /// The compiler rejected the source. Nothing was executed.
    Compile(Vec<CompileError>),
    /// The program compiled, started, and failed partway through.
    Runtime(RuntimeError),
}

impl From<Vec<CompileError>> for InterpretError {
    fn from(errors: Vec<CompileError>) -> InterpretError {
        InterpretError::Compile(errors)
    }
}

impl From<RuntimeError> for InterpretError {
    fn from(e: RuntimeError) -> InterpretError {
        InterpretError::Runtime(e)
    }
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile(errors) => write!(f, "{}", errors.iter().format("\n")),
            InterpretError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for InterpretError {}
