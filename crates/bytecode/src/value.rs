use std::fmt::{self, Display};

use static_assertions::assert_eq_size;

use crate::obj::{Heap, Obj, ObjRef};

/// A runtime value. Copied freely between stack slots, constant tables and
/// object fields; everything bigger than two machine words lives behind an
/// [`ObjRef`] into the heap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Val {
    Nil,
    Bool(bool),
    Num(f64),
    Obj(ObjRef),
}

assert_eq_size!(Val, [u8; 16]);

impl Val {
    /// Returns `true` if the val is [`Nil`].
    ///
    /// [`Nil`]: Val::Nil
    pub fn is_nil(self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns `true` if the val is [`Bool`].
    ///
    /// [`Bool`]: Val::Bool
    pub fn is_bool(self) -> bool {
        matches!(self, Self::Bool(..))
    }

    pub fn as_bool(self) -> Option<bool> {
        if let Self::Bool(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Returns `true` if the val is [`Num`].
    ///
    /// [`Num`]: Val::Num
    pub fn is_num(self) -> bool {
        matches!(self, Self::Num(..))
    }

    pub fn as_num(self) -> Option<f64> {
        if let Self::Num(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Returns `true` if the val is [`Obj`].
    ///
    /// [`Obj`]: Val::Obj
    pub fn is_obj(self) -> bool {
        matches!(self, Self::Obj(..))
    }

    pub fn as_obj(self) -> Option<ObjRef> {
        if let Self::Obj(v) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Convert this value to boolean.
    ///
    /// The only falsy values are `false` and `nil`. Everything else,
    /// including `0` and the empty string, is truthy.
    pub fn truthy(self) -> bool {
        !matches!(self, Val::Bool(false) | Val::Nil)
    }
}

impl From<f64> for Val {
    fn from(n: f64) -> Self {
        Val::Num(n)
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<ObjRef> for Val {
    fn from(r: ObjRef) -> Self {
        Val::Obj(r)
    }
}

/// Renders a value for user output. Object payloads live in the heap, so
/// display borrows it; obtained through [`Heap::show`].
pub struct ValDisplay<'h> {
    pub(crate) val: Val,
    pub(crate) heap: &'h Heap,
}

impl Display for ValDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.val {
            Val::Nil => write!(f, "nil"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Num(n) => write!(f, "{}", n),
            Val::Obj(r) => match self.heap.get(r) {
                Some(Obj::Str(s)) => f.write_str(&s.text),
                Some(Obj::Fun(fun)) => fmt_fun_name(f, self.heap, fun.name),
                Some(Obj::Closure(c)) => fmt_fun_name(f, self.heap, c.fun.name),
                Some(Obj::Upvalue(..)) => write!(f, "upvalue"),
                Some(Obj::Native(..)) => write!(f, "<native fn>"),
                None => write!(f, "<freed object>"),
            },
        }
    }
}

fn fmt_fun_name(f: &mut fmt::Formatter<'_>, heap: &Heap, name: Option<ObjRef>) -> fmt::Result {
    match name.and_then(|n| heap.as_str(n)) {
        Some(s) => write!(f, "<fn {}>", s.text),
        None => write!(f, "<script>"),
    }
}
