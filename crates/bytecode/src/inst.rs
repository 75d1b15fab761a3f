mod param;
mod util;

use enum_ordinalize::Ordinalize;

pub use param::{Argc, ConstIdx, Rel, Slot, UpSlot};
pub use param::{IParamType, ParamType};

pub use util::*;

macro_rules! define_inst {
    (
        $(#[$meta:meta])*
        // type names
        $ty_vis:vis $type:ident,
        // instruction variant definition
        $(
            // metadata for this variant. Will be put inside the final enum
            $(#[$variant_meta:meta])*
            // variant name
            $name:ident
            // param
            $(($param_name:ident : $param:ident))?
        ),* $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Copy, Ordinalize)]
        #[repr(u8)]
        $ty_vis enum $type {$(
            $(#[$variant_meta])*
            $name
        ),*}

        impl $type {
            /// Returns the type of the parameter of this instruction
            pub fn param_type(self) -> Option<ParamType> {
                #[allow(path_statements)]
                match self {$(
                    $type::$name => {
                        None::<ParamType>
                        $(; Some(ParamType::$param))?
                    }
                ),*
                }
            }

            /// Returns the name of this instruction, as printed by disassembly
            pub fn name(self) -> &'static str {
                match self {$(
                    Self::$name => stringify!($name)
                ),*}
            }
        }

        impl ::std::fmt::Display for $type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.name())
            }
        }
    };
}

// instruction definition.
//
// Each instruction has at most 1 parameter, encoded in fixed width so the
// compiler can patch jump operands after their targets are known.
define_inst! {
    /// The list of instructions. Each instruction either has 0 or exactly 1
    /// parameter, except `ClosureNew`, which is followed in the stream by one
    /// `(is_local, index)` byte pair per captured upvalue.
    pub Inst,

    // constants
    /// Push a value from the constant table
    PushConst(idx: ConstIdx),
    /// Push nil
    PushNil,
    /// Push boolean true
    PushTrue,
    /// Push boolean false
    PushFalse,

    // stack manipulation
    /// Pop a value from the stack
    Pop,

    // load/stores
    /// Load a value from the `slot`th stack slot of the current frame
    LoadLocal(slot: Slot),
    /// Store the stack top into the `slot`th stack slot of the current frame
    StoreLocal(slot: Slot),
    /// Load the global named by the `idx`th constant
    LoadGlobal(idx: ConstIdx),
    /// Define the global named by the `idx`th constant from the stack top
    DefineGlobal(idx: ConstIdx),
    /// Store the stack top into the already-defined global named by the
    /// `idx`th constant
    StoreGlobal(idx: ConstIdx),
    /// Load the `slot`th upvalue of the running closure
    LoadUpvalue(slot: UpSlot),
    /// Store the stack top into the `slot`th upvalue of the running closure
    StoreUpvalue(slot: UpSlot),

    // operators
    /// Pop two values, push whether they are equal
    Eq,
    /// Pop two numbers, push whether the first is greater
    Gt,
    /// Pop two numbers, push whether the first is smaller
    Lt,
    /// Add two numbers or concatenate two strings
    Add,
    Sub,
    Mul,
    Div,
    /// Logical negation by truthiness
    Not,
    /// Numeric negation
    Neg,

    // statements
    /// Pop and print a value followed by a newline
    Print,

    // control flow
    /// Jump forward by `off` bytes
    Jump(off: Rel),
    /// Jump forward by `off` bytes if the stack top is falsy. Peeks, does not
    /// pop.
    JumpIfFalse(off: Rel),
    /// Jump backward by `off` bytes
    Loop(off: Rel),

    // functions
    /// Call the value under the topmost `n_args` stack values
    Call(n_args: Argc),
    /// Wrap the function in the `idx`th constant into a closure, capturing
    /// upvalues described by the byte pairs that follow
    ClosureNew(idx: ConstIdx),
    /// Move the topmost stack slot into the heap, then pop it
    CloseUpvalue,
    /// Return from the current function with the stack top as result
    Return,
}
