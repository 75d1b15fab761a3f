//! Bytecode generation for basalt.
//!
//! There is no syntax tree. [`compile`] drives a single-pass Pratt parser
//! over the token stream and each function's chunk is emitted as its body
//! is parsed.

mod compiler;
mod error;
mod rules;
mod scope;

#[cfg(test)]
mod test;

pub use error::{CompileError, ErrorAt};

use basalt_bytecode::{Heap, ObjRef};

/// Compile `source` into a script function allocated in `heap`.
///
/// The returned function takes no arguments and has no name; running the
/// program means calling it. On failure every error the parser managed to
/// recover past is returned, in source order.
pub fn compile(source: &str, heap: &mut Heap) -> Result<ObjRef, Vec<CompileError>> {
    compiler::compile(source, heap)
}
