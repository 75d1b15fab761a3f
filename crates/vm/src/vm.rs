use std::io::Write;

use bytes::Buf;
use itertools::Itertools;
use slotmap::SecondaryMap;
use smol_str::SmolStr;
use tracing::{debug, trace};

use basalt_bytecode::debug::inst_at;
use basalt_bytecode::inst::{Argc, ConstIdx, Inst, InstContainer, Rel, Slot, UpSlot};
use basalt_bytecode::obj::{Closure, Native, NativeFn, Upvalue};
use basalt_bytecode::table::Table;
use basalt_bytecode::{Heap, Obj, ObjRef, Val};

use crate::error::{InterpretError, RuntimeError, TraceLine};
use crate::gc;

mod frame;

use frame::Frame;

/// Deepest allowed call nesting. Exceeding it raises a runtime error instead
/// of exhausting the host stack.
const FRAMES_MAX: usize = 64;

/// An upvalue still pointing into the value stack.
pub(crate) struct OpenUpvalue {
    /// Stack index of the captured slot.
    pub at: usize,
    /// The heap cell closures read the variable through.
    pub cell: ObjRef,
}

/// What a call expression resolved to.
enum Callee {
    Closure(ObjRef),
    Native(NativeFn),
}

/// A stack interpreter over compiled chunks.
///
/// The VM owns the heap, the value stack, the call stack, and the global
/// table. [`Vm::interpret`] compiles a source string and runs it to
/// completion; program output goes to the writer the caller passes in.
/// Globals and interned strings survive across `interpret` calls, so a REPL
/// can keep feeding lines to one VM.
pub struct Vm {
    pub(crate) heap: Heap,
    pub(crate) stack: Vec<Val>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) globals: Table<Val>,
    /// Upvalues whose variable is still on the stack. Closed and removed
    /// when the variable's slot is about to leave the stack.
    pub(crate) open_upvalues: Vec<OpenUpvalue>,
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new()
    }
}

impl Vm {
    pub fn new() -> Vm {
        Vm {
            heap: Heap::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            globals: Table::new(),
            open_upvalues: Vec::new(),
        }
    }

    /// The VM's heap, for inspecting objects referenced by values.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Bind a host function as a global named `name`.
    pub fn define_native(&mut self, name: &str, fun: NativeFn) {
        let name = self.heap.intern(name);
        let hash = self.str_hash(name);
        let native = self.heap.alloc_native(Native { name, fun });
        self.globals.set(name, hash, Val::Obj(native));
    }

    /// Every object the VM can still reach. Anything absent from the map is
    /// garbage.
    pub fn reachable_objects(&self) -> SecondaryMap<ObjRef, ()> {
        gc::reachable(self)
    }

    /// Compile `source` and run it. Program output is written to `out`.
    ///
    /// On a runtime error the stacks are reset, leaving the VM ready for the
    /// next call.
    pub fn interpret<W: Write>(&mut self, source: &str, out: &mut W) -> Result<(), InterpretError> {
        let script = basalt_codegen::compile(source, &mut self.heap)?;
        let fun = self
            .heap
            .as_fun(script)
            .expect("Compilation produces a function")
            .clone();
        let closure = self.heap.alloc_closure(Closure {
            fun,
            upvalues: Vec::new().into_boxed_slice(),
        });
        self.push(Val::Obj(closure));
        let run = self
            .call_closure(closure, 0)
            .and_then(|()| self.run(out));
        run.map_err(|e| {
            self.reset();
            e.into()
        })
    }

    fn run<W: Write>(&mut self, out: &mut W) -> Result<(), RuntimeError> {
        loop {
            {
                let frame = self.frame();
                trace!(
                    "{} [{}]",
                    inst_at(&frame.fun.chunk, &self.heap, frame.position()),
                    self.stack.iter().map(|v| self.heap.show(*v)).format(", ")
                );
            }
            let inst = match self.frame_mut().read_inst() {
                Some(inst) => inst,
                None => return Err(self.error("Unknown opcode.")),
            };
            match inst {
                Inst::PushConst => {
                    let idx = self.frame_mut().read_param::<ConstIdx>();
                    let v = self.constant(idx);
                    self.push(v);
                }
                Inst::PushNil => self.push(Val::Nil),
                Inst::PushTrue => self.push(Val::Bool(true)),
                Inst::PushFalse => self.push(Val::Bool(false)),
                Inst::Pop => {
                    self.pop();
                }
                Inst::LoadLocal => {
                    let slot = self.frame_mut().read_param::<Slot>();
                    let v = self.stack[self.frame().base + slot.0 as usize];
                    self.push(v);
                }
                Inst::StoreLocal => {
                    let slot = self.frame_mut().read_param::<Slot>();
                    let at = self.frame().base + slot.0 as usize;
                    self.stack[at] = self.peek(0);
                }
                Inst::LoadGlobal => {
                    let (name, hash) = self.read_global_name();
                    match self.globals.get(name, hash).copied() {
                        Some(v) => self.push(v),
                        None => return Err(self.undefined_variable(name)),
                    }
                }
                Inst::DefineGlobal => {
                    let (name, hash) = self.read_global_name();
                    let v = self.peek(0);
                    self.globals.set(name, hash, v);
                    self.pop();
                }
                Inst::StoreGlobal => {
                    let (name, hash) = self.read_global_name();
                    let v = self.peek(0);
                    // A store never creates a global. If the key was new the
                    // variable did not exist; undo and report.
                    if self.globals.set(name, hash, v) {
                        self.globals.delete(name, hash);
                        return Err(self.undefined_variable(name));
                    }
                }
                Inst::LoadUpvalue => {
                    let slot = self.frame_mut().read_param::<UpSlot>();
                    let cell = self.upvalue_cell(slot);
                    let v = match self
                        .heap
                        .upvalue(cell)
                        .copied()
                        .expect("Closure captures are upvalue objects")
                    {
                        Upvalue::Open(at) => self.stack[at],
                        Upvalue::Closed(v) => v,
                    };
                    self.push(v);
                }
                Inst::StoreUpvalue => {
                    let slot = self.frame_mut().read_param::<UpSlot>();
                    let v = self.peek(0);
                    let cell = self.upvalue_cell(slot);
                    match self
                        .heap
                        .upvalue_mut(cell)
                        .expect("Closure captures are upvalue objects")
                    {
                        Upvalue::Open(at) => {
                            let at = *at;
                            self.stack[at] = v;
                        }
                        closed @ Upvalue::Closed(_) => *closed = Upvalue::Closed(v),
                    }
                }
                Inst::Eq => {
                    let (lhs, rhs) = self.pop2();
                    self.push(Val::Bool(lhs == rhs));
                }
                Inst::Gt => self.num_binop(|lhs, rhs| Val::Bool(lhs > rhs))?,
                Inst::Lt => self.num_binop(|lhs, rhs| Val::Bool(lhs < rhs))?,
                Inst::Add => {
                    let lhs = self.peek(1);
                    let rhs = self.peek(0);
                    if let Some(text) = self.concat_strs(lhs, rhs) {
                        self.pop2();
                        let obj = self.heap.intern_owned(text);
                        self.push(Val::Obj(obj));
                    } else if let (Some(lhs), Some(rhs)) = (lhs.as_num(), rhs.as_num()) {
                        self.pop2();
                        self.push(Val::Num(lhs + rhs));
                    } else {
                        return Err(self.error("Operands must be two numbers or two strings."));
                    }
                }
                Inst::Sub => self.num_binop(|lhs, rhs| Val::Num(lhs - rhs))?,
                Inst::Mul => self.num_binop(|lhs, rhs| Val::Num(lhs * rhs))?,
                Inst::Div => self.num_binop(|lhs, rhs| Val::Num(lhs / rhs))?,
                Inst::Not => {
                    let v = self.pop();
                    self.push(Val::Bool(!v.truthy()));
                }
                Inst::Neg => match self.peek(0).as_num() {
                    Some(n) => {
                        self.pop();
                        self.push(Val::Num(-n));
                    }
                    None => return Err(self.error("Operand must be a number.")),
                },
                Inst::Print => {
                    let v = self.pop();
                    if let Err(e) = writeln!(out, "{}", self.heap.show(v)) {
                        return Err(self.error(e.to_string()));
                    }
                }
                Inst::Jump => {
                    let off = self.frame_mut().read_param::<Rel>();
                    let frame = self.frame_mut();
                    let target = frame.position() + off.0 as usize;
                    frame.seek(target);
                }
                Inst::JumpIfFalse => {
                    let off = self.frame_mut().read_param::<Rel>();
                    if !self.peek(0).truthy() {
                        let frame = self.frame_mut();
                        let target = frame.position() + off.0 as usize;
                        frame.seek(target);
                    }
                }
                Inst::Loop => {
                    let off = self.frame_mut().read_param::<Rel>();
                    let frame = self.frame_mut();
                    let target = frame.position() - off.0 as usize;
                    frame.seek(target);
                }
                Inst::Call => {
                    let argc = self.frame_mut().read_param::<Argc>();
                    self.call_value(argc.0 as usize)?;
                }
                Inst::ClosureNew => {
                    let idx = self.frame_mut().read_param::<ConstIdx>();
                    let fun_ref = self
                        .constant(idx)
                        .as_obj()
                        .expect("Closure constants are functions");
                    let fun = self
                        .heap
                        .as_fun(fun_ref)
                        .expect("Closure constants are functions")
                        .clone();
                    let mut upvalues = Vec::with_capacity(fun.upvalue_count);
                    for _ in 0..fun.upvalue_count {
                        let is_local = self.frame_mut().get_u8() != 0;
                        let index = self.frame_mut().get_u8();
                        let cell = if is_local {
                            let at = self.frame().base + index as usize;
                            self.capture_upvalue(at)
                        } else {
                            self.upvalue_cell(UpSlot(index))
                        };
                        upvalues.push(cell);
                    }
                    let closure = self.heap.alloc_closure(Closure {
                        fun,
                        upvalues: upvalues.into_boxed_slice(),
                    });
                    self.push(Val::Obj(closure));
                }
                Inst::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }
                Inst::Return => {
                    let result = self.pop();
                    let frame = self
                        .frames
                        .pop()
                        .expect("The VM always runs inside a frame");
                    self.close_upvalues(frame.base);
                    if self.frames.is_empty() {
                        // Slot 0 still holds the script closure.
                        self.pop();
                        debug!("script finished");
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    self.push(result);
                }
            }
        }
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("The VM always runs inside a frame")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames
            .last_mut()
            .expect("The VM always runs inside a frame")
    }

    fn push(&mut self, v: Val) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Val {
        self.stack.pop().expect("Popping empty stack")
    }

    fn pop2(&mut self) -> (Val, Val) {
        let rhs = self.pop();
        let lhs = self.pop();
        (lhs, rhs)
    }

    fn peek(&self, depth: usize) -> Val {
        self.stack[self.stack.len() - 1 - depth]
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }

    fn constant(&self, idx: ConstIdx) -> Val {
        self.frame().fun.chunk.constants[idx.0 as usize]
    }

    fn str_hash(&self, r: ObjRef) -> u64 {
        self.heap.as_str(r).expect("Interned names are strings").hash
    }

    /// Read a constant parameter that names a global. The compiler only puts
    /// interned strings in these slots.
    fn read_global_name(&mut self) -> (ObjRef, u64) {
        let idx = self.frame_mut().read_param::<ConstIdx>();
        let name = self
            .constant(idx)
            .as_obj()
            .expect("Global name constants are interned strings");
        (name, self.str_hash(name))
    }

    /// The cell behind upvalue `slot` of the running closure.
    fn upvalue_cell(&self, slot: UpSlot) -> ObjRef {
        let closure = self.frame().closure;
        self.heap
            .as_closure(closure)
            .expect("Frames always run closures")
            .upvalues[slot.0 as usize]
    }

    /// An open upvalue for stack slot `at`, reusing the existing cell if the
    /// slot is already captured so every closure sees the same variable.
    fn capture_upvalue(&mut self, at: usize) -> ObjRef {
        match self.open_upvalues.iter().find(|open| open.at == at) {
            Some(open) => open.cell,
            None => {
                let cell = self.heap.alloc_upvalue(Upvalue::Open(at));
                self.open_upvalues.push(OpenUpvalue { at, cell });
                cell
            }
        }
    }

    /// Close every open upvalue at stack index `from` or above: copy the
    /// variable off the stack into its cell before the slot disappears.
    fn close_upvalues(&mut self, from: usize) {
        let stack = &self.stack;
        let heap = &mut self.heap;
        self.open_upvalues.retain(|open| {
            if open.at < from {
                return true;
            }
            if let Some(u) = heap.upvalue_mut(open.cell) {
                *u = Upvalue::Closed(stack[open.at]);
            }
            false
        });
    }

    fn call_value(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let callee = self.peek(argc);
        let target = callee.as_obj().and_then(|r| match self.heap.get(r) {
            Some(Obj::Closure(_)) => Some(Callee::Closure(r)),
            Some(Obj::Native(native)) => Some(Callee::Native(native.fun)),
            _ => None,
        });
        match target {
            Some(Callee::Closure(closure)) => self.call_closure(closure, argc),
            Some(Callee::Native(fun)) => self.call_native(fun, argc),
            None => Err(self.error("Can only call functions and classes.")),
        }
    }

    fn call_closure(&mut self, closure: ObjRef, argc: usize) -> Result<(), RuntimeError> {
        let fun = self
            .heap
            .as_closure(closure)
            .expect("Calls enter closure objects")
            .fun
            .clone();
        if argc != fun.arity as usize {
            return Err(self.error(format!(
                "Expected {} arguments but got {}.",
                fun.arity, argc
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.error("Stack overflow."));
        }
        let base = self.stack.len() - argc - 1;
        trace!(
            "entering {} with base {}",
            self.heap.show(Val::Obj(closure)),
            base
        );
        self.frames.push(Frame::new(closure, fun, base));
        Ok(())
    }

    /// Natives run in place: arguments are read off the stack, and the
    /// callee and arguments are replaced by the result.
    fn call_native(&mut self, fun: NativeFn, argc: usize) -> Result<(), RuntimeError> {
        let args_at = self.stack.len() - argc;
        let result = fun(&self.stack[args_at..]).map_err(|e| self.error(e.0))?;
        self.stack.truncate(args_at - 1);
        self.push(result);
        Ok(())
    }

    fn num_binop(&mut self, op: impl FnOnce(f64, f64) -> Val) -> Result<(), RuntimeError> {
        match (self.peek(1).as_num(), self.peek(0).as_num()) {
            (Some(lhs), Some(rhs)) => {
                self.pop2();
                self.push(op(lhs, rhs));
                Ok(())
            }
            _ => Err(self.error("Operands must be numbers.")),
        }
    }

    /// The concatenation of two string values, or `None` if either operand
    /// is not a string.
    fn concat_strs(&self, lhs: Val, rhs: Val) -> Option<String> {
        let lhs = self.heap.as_str(lhs.as_obj()?)?;
        let rhs = self.heap.as_str(rhs.as_obj()?)?;
        let mut text = String::with_capacity(lhs.text.len() + rhs.text.len());
        text.push_str(&lhs.text);
        text.push_str(&rhs.text);
        Some(text)
    }

    fn undefined_variable(&self, name: ObjRef) -> RuntimeError {
        let text = self.heap.as_str(name).map(|s| &*s.text).unwrap_or("?");
        self.error(format!("Undefined variable '{}'.", text))
    }

    /// Build a runtime error carrying the current call trace, innermost
    /// frame first.
    fn error(&self, message: impl Into<String>) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| TraceLine {
                line: frame.current_line(),
                name: frame
                    .fun
                    .name
                    .and_then(|n| self.heap.as_str(n))
                    .map(|s| SmolStr::new(&*s.text)),
            })
            .collect();
        RuntimeError::new(message, trace)
    }
}
