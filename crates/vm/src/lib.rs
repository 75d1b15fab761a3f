//! The basalt virtual machine.
//!
//! [`Vm`] owns the heap, the value stack, and the call stack. Feed it source
//! text through [`Vm::interpret`]: the program's `print` output lands on the
//! writer you pass in, and failures come back as an [`InterpretError`] that
//! distinguishes compile-time rejection from runtime faults.

mod error;
mod gc;
mod vm;

#[cfg(test)]
mod test;

pub use error::{InterpretError, RuntimeError, TraceLine};
pub use vm::Vm;
