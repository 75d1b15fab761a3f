//! Per-function compile state: the locals array, lexical scope depths, and
//! the upvalues a closure captures from its enclosing functions.
//!
//! Local variables live on the value stack at fixed slots, so the compiler
//! only needs to track which slot a name resolved to. A name that resolves
//! into an enclosing function instead becomes an upvalue, and the local it
//! refers to is flagged so the enclosing function closes it over when its
//! scope ends.

use std::cell::{Cell, RefCell};

use basalt_bytecode::inst::Inst;
use basalt_bytecode::{Chunk, ObjRef};
use fnv::FnvHashMap;

/// How many locals a single function can address. Slot operands are one
/// byte wide, and slot 0 is reserved for the function itself.
pub(crate) const LOCALS_MAX: usize = u8::MAX as usize + 1;

/// How many upvalues a single function can capture.
pub(crate) const UPVALUES_MAX: usize = u8::MAX as usize + 1;

/// What kind of function body is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FnKind {
    /// The implicit function wrapping top-level code.
    Script,
    /// A `fun` declaration.
    Function,
}

/// A local variable slot in the function being compiled.
#[derive(Debug)]
pub(crate) struct Local<'src> {
    pub name: &'src str,
    /// Scope depth the local was declared at, or `None` between its
    /// declaration and the end of its initializer. Resolving a `None`
    /// local means the initializer refers to the name it is defining.
    pub depth: Option<u32>,
    /// Set when a nested function captures this local, so scope exit
    /// hoists it into a heap cell instead of discarding it.
    pub captured: Cell<bool>,
}

/// A capture recorded for the function being compiled: either a local
/// slot of the directly enclosing function, or one of its upvalues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpvalueDesc {
    pub index: u8,
    pub is_local: bool,
}

/// Result of looking a name up in a function's locals.
pub(crate) enum LocalSlot {
    Found(u8),
    /// Declared in this function but still inside its own initializer.
    Uninitialized(u8),
    Missing,
}

/// Compile state for one function. The compiler keeps a stack of these,
/// one per nested `fun` it is currently inside.
pub(crate) struct FnCompiler<'src> {
    pub kind: FnKind,
    pub fun_name: Option<ObjRef>,
    pub arity: u8,
    pub chunk: Chunk,
    pub locals: Vec<Local<'src>>,
    pub scope_depth: u32,
    /// Captures recorded so far. Cross-function resolution mutates this
    /// through a shared view of the compiler stack, hence the `RefCell`.
    pub upvalues: RefCell<Vec<UpvalueDesc>>,
    /// Interned objects already present in this chunk's constant pool.
    pub const_cache: FnvHashMap<ObjRef, u8>,
}

impl<'src> FnCompiler<'src> {
    pub fn new(kind: FnKind, fun_name: Option<ObjRef>) -> FnCompiler<'src> {
        FnCompiler {
            kind,
            fun_name,
            arity: 0,
            chunk: Chunk::default(),
            // Slot 0 holds the function value itself at runtime. An empty
            // name keeps it out of every lookup.
            locals: vec![Local {
                name: "",
                depth: Some(0),
                captured: Cell::new(false),
            }],
            scope_depth: 0,
            upvalues: RefCell::new(Vec::new()),
            const_cache: FnvHashMap::default(),
        }
    }

    /// Reserve a slot for a new local in the current scope.
    pub fn add_local(&mut self, name: &'src str) -> Result<(), &'static str> {
        if self.locals.len() == LOCALS_MAX {
            return Err("Too many local variables in function.");
        }
        self.locals.push(Local {
            name,
            depth: None,
            captured: Cell::new(false),
        });
        Ok(())
    }

    /// Whether `name` was already declared in the innermost scope.
    pub fn is_declared_in_scope(&self, name: &str) -> bool {
        for local in self.locals.iter().rev() {
            match local.depth {
                Some(depth) if depth < self.scope_depth => break,
                _ => {
                    if local.name == name {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Mark the most recent local as usable, now that its initializer
    /// has finished compiling. Top-level declarations are globals and
    /// have no local to mark.
    pub fn mark_initialized(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(self.scope_depth);
        }
    }

    /// Resolve `name` against this function's locals, innermost first.
    pub fn resolve_local(&self, name: &str) -> LocalSlot {
        for (slot, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                return match local.depth {
                    Some(_) => LocalSlot::Found(slot as u8),
                    None => LocalSlot::Uninitialized(slot as u8),
                };
            }
        }
        LocalSlot::Missing
    }

    pub fn mark_captured(&self, slot: u8) {
        self.locals[slot as usize].captured.set(true);
    }

    /// Record a capture of `index` (a local slot or upvalue index of the
    /// enclosing function) and return its upvalue index here. Capturing
    /// the same thing twice reuses the earlier entry.
    pub fn add_upvalue(&self, index: u8, is_local: bool) -> Result<u8, &'static str> {
        let mut upvalues = self.upvalues.borrow_mut();
        for (i, upvalue) in upvalues.iter().enumerate() {
            if upvalue.index == index && upvalue.is_local == is_local {
                return Ok(i as u8);
            }
        }
        if upvalues.len() == UPVALUES_MAX {
            return Err("Too many closure variables in function.");
        }
        upvalues.push(UpvalueDesc { index, is_local });
        Ok((upvalues.len() - 1) as u8)
    }

    /// Close the innermost scope, discarding its locals. Captured locals
    /// are closed into heap cells, plain ones are simply popped.
    pub fn end_scope(&mut self, line: u32) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            let discard = match local.depth {
                Some(depth) => depth > self.scope_depth,
                None => true,
            };
            if !discard {
                break;
            }
            if local.captured.get() {
                self.chunk.emit(Inst::CloseUpvalue, line);
            } else {
                self.chunk.emit(Inst::Pop, line);
            }
            self.locals.pop();
        }
    }
}

/// Resolve `name` as an upvalue of `stack[at]`, searching enclosing
/// functions outwards. Records the capture chain in every function it
/// passes through, so a deeply nested closure reaches a far-away local
/// through one upvalue per level.
pub(crate) fn resolve_upvalue(
    stack: &[&FnCompiler<'_>],
    at: usize,
    name: &str,
) -> Result<Option<u8>, &'static str> {
    if at == 0 {
        return Ok(None);
    }
    let enclosing = stack[at - 1];
    match enclosing.resolve_local(name) {
        LocalSlot::Found(slot) | LocalSlot::Uninitialized(slot) => {
            enclosing.mark_captured(slot);
            return stack[at].add_upvalue(slot, true).map(Some);
        }
        LocalSlot::Missing => {}
    }
    if let Some(upvalue) = resolve_upvalue(stack, at - 1, name)? {
        return stack[at].add_upvalue(upvalue, false).map(Some);
    }
    Ok(None)
}
