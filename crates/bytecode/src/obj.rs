use std::fmt;
use std::hash::Hasher;
use std::rc::Rc;

use fnv::FnvHasher;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::table::Table;
use crate::value::{Val, ValDisplay};
use crate::Chunk;

new_key_type! {
    /// A non-owning handle to a heap object. Generational: a dangling ref
    /// never resolves to a different object.
    pub struct ObjRef;
}

/// A heap-allocated string. Immutable; the hash is computed once at
/// allocation and reused by every table probe.
#[derive(Debug)]
pub struct Str {
    pub text: Box<str>,
    pub hash: u64,
}

/// A compiled function: its code, arity, and how many upvalues a closure
/// over it captures. Shared between the heap entry, closures and call
/// frames via `Rc`; immutable once compilation ends.
#[derive(Debug)]
pub struct Function {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// Interned name, `None` for the top-level script
    pub name: Option<ObjRef>,
}

impl Function {
    pub fn new(name: Option<ObjRef>) -> Function {
        Function {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name,
        }
    }
}

/// The runtime representation of a function value: the function plus the
/// captured variables it closes over. Multiple closures may share one
/// function.
#[derive(Debug)]
pub struct Closure {
    pub fun: Rc<Function>,
    pub upvalues: Box<[ObjRef]>,
}

/// A captured variable. `Open` points at a live value-stack slot; when the
/// slot leaves the stack the upvalue transitions to `Closed`, carrying the
/// value itself. The transition happens exactly once and never reverses.
#[derive(Debug, Clone, Copy)]
pub enum Upvalue {
    Open(usize),
    Closed(Val),
}

/// A host function callable from scripts.
pub struct Native {
    pub name: ObjRef,
    pub fun: NativeFn,
}

pub type NativeFn = fn(&[Val]) -> Result<Val, NativeError>;

/// An error raised by a native function. Surfaces as a runtime error at the
/// call site.
#[derive(Debug)]
pub struct NativeError(pub String);

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NativeError {
    fn from(s: String) -> Self {
        NativeError(s)
    }
}

impl From<&str> for NativeError {
    fn from(s: &str) -> Self {
        NativeError(s.to_owned())
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Native").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub enum Obj {
    Str(Str),
    Fun(Rc<Function>),
    Closure(Closure),
    Upvalue(Upvalue),
    Native(Native),
}

/// Owns every heap object. The arena is the all-objects list: dropping the
/// heap releases each allocation exactly once, and walking it visits every
/// live object. Strings are interned, so equal content implies an equal
/// [`ObjRef`].
#[derive(Debug, Default)]
pub struct Heap {
    objects: SlotMap<ObjRef, Obj>,
    strings: Table<()>,
}

impl Heap {
    pub fn new() -> Heap {
        Heap::default()
    }

    /// Intern a borrowed string, copying it only when no object with this
    /// content exists yet.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        let hash = hash_str(text);
        if let Some(existing) = self.find_interned(text, hash) {
            return existing;
        }
        self.insert_str(text.into(), hash)
    }

    /// Intern an owned string, reusing its allocation on a miss. Used for
    /// values built at runtime, like concatenation results.
    pub fn intern_owned(&mut self, text: String) -> ObjRef {
        let hash = hash_str(&text);
        if let Some(existing) = self.find_interned(&text, hash) {
            return existing;
        }
        self.insert_str(text.into_boxed_str(), hash)
    }

    fn find_interned(&self, text: &str, hash: u64) -> Option<ObjRef> {
        self.strings.find_with(hash, |r| {
            matches!(self.objects.get(r), Some(Obj::Str(s)) if &*s.text == text)
        })
    }

    fn insert_str(&mut self, text: Box<str>, hash: u64) -> ObjRef {
        let r = self.objects.insert(Obj::Str(Str { text, hash }));
        self.strings.set(r, hash, ());
        r
    }

    pub fn alloc_fun(&mut self, f: Function) -> ObjRef {
        self.objects.insert(Obj::Fun(Rc::new(f)))
    }

    pub fn alloc_closure(&mut self, c: Closure) -> ObjRef {
        self.objects.insert(Obj::Closure(c))
    }

    pub fn alloc_upvalue(&mut self, u: Upvalue) -> ObjRef {
        self.objects.insert(Obj::Upvalue(u))
    }

    pub fn alloc_native(&mut self, n: Native) -> ObjRef {
        self.objects.insert(Obj::Native(n))
    }

    pub fn get(&self, r: ObjRef) -> Option<&Obj> {
        self.objects.get(r)
    }

    pub fn as_str(&self, r: ObjRef) -> Option<&Str> {
        if let Some(Obj::Str(s)) = self.objects.get(r) {
            Some(s)
        } else {
            None
        }
    }

    pub fn as_fun(&self, r: ObjRef) -> Option<&Rc<Function>> {
        if let Some(Obj::Fun(f)) = self.objects.get(r) {
            Some(f)
        } else {
            None
        }
    }

    pub fn as_closure(&self, r: ObjRef) -> Option<&Closure> {
        if let Some(Obj::Closure(c)) = self.objects.get(r) {
            Some(c)
        } else {
            None
        }
    }

    pub fn as_native(&self, r: ObjRef) -> Option<&Native> {
        if let Some(Obj::Native(n)) = self.objects.get(r) {
            Some(n)
        } else {
            None
        }
    }

    pub fn upvalue(&self, r: ObjRef) -> Option<&Upvalue> {
        if let Some(Obj::Upvalue(u)) = self.objects.get(r) {
            Some(u)
        } else {
            None
        }
    }

    pub fn upvalue_mut(&mut self, r: ObjRef) -> Option<&mut Upvalue> {
        if let Some(Obj::Upvalue(u)) = self.objects.get_mut(r) {
            Some(u)
        } else {
            None
        }
    }

    /// The number of live heap objects of any kind.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// The number of distinct interned strings.
    pub fn interned_count(&self) -> usize {
        self.strings.len()
    }

    /// A display adapter for `v` that can render object payloads.
    pub fn show(&self, v: Val) -> ValDisplay<'_> {
        ValDisplay { val: v, heap: self }
    }

    /// Every object reachable from `roots` through the object graph. This is
    /// the marking pass a tracing collector would run; callable at any
    /// instruction boundary.
    pub fn reachable(&self, roots: impl IntoIterator<Item = ObjRef>) -> SecondaryMap<ObjRef, ()> {
        let mut marked: SecondaryMap<ObjRef, ()> = SecondaryMap::new();
        let mut pending: Vec<ObjRef> = roots.into_iter().collect();
        while let Some(r) = pending.pop() {
            if marked.contains_key(r) || !self.objects.contains_key(r) {
                continue;
            }
            marked.insert(r, ());
            match &self.objects[r] {
                Obj::Str(_) => {}
                Obj::Fun(f) => push_fun_edges(f, &mut pending),
                Obj::Closure(c) => {
                    push_fun_edges(&c.fun, &mut pending);
                    pending.extend(c.upvalues.iter().copied());
                }
                Obj::Upvalue(Upvalue::Closed(Val::Obj(o))) => pending.push(*o),
                Obj::Upvalue(_) => {}
                Obj::Native(n) => pending.push(n.name),
            }
        }
        marked
    }
}

fn push_fun_edges(f: &Function, pending: &mut Vec<ObjRef>) {
    if let Some(name) = f.name {
        pending.push(name);
    }
    for v in &f.chunk.constants {
        if let Val::Obj(o) = v {
            pending.push(*o);
        }
    }
}

pub(crate) fn hash_str(text: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(text.as_bytes());
    hasher.finish()
}
