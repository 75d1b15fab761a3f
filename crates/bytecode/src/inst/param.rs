use bytes::{Buf, BufMut};
use std::fmt::Display;

/// A parameter encoded after an instruction byte.
///
/// All params are fixed-width: jump offsets are patched after the jump is
/// emitted, so their encoded size must not depend on their value.
pub trait IParamType: Sized {
    const PARAM_ENUM_TY: ParamType;

    /// Parse the param from the buffer's head pointer. **Panics if the buffer
    /// is exhausted.**
    fn parse(r: impl Buf) -> Self;

    /// Write the param into the given buffer.
    fn write(&self, w: impl BufMut);
}

/// The kinds of instruction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// An index in the constant table
    ConstIdx,
    /// A stack slot of the current frame
    Slot,
    /// An upvalue slot of the running closure
    UpSlot,
    /// An argument count
    Argc,
    /// A relative jump distance in bytes
    Rel,
}

impl ParamType {
    /// Encoded size in bytes.
    pub fn width(self) -> usize {
        match self {
            ParamType::Rel => 2,
            _ => 1,
        }
    }
}

macro_rules! byte_param {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        pub struct $name(pub u8);

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl IParamType for $name {
            const PARAM_ENUM_TY: ParamType = ParamType::$name;

            fn parse(mut r: impl Buf) -> Self {
                $name(r.get_u8())
            }

            fn write(&self, mut w: impl BufMut) {
                w.put_u8(self.0)
            }
        }
    };
}

byte_param! {
    /// An index into the constant table of the surrounding function
    ConstIdx
}

byte_param! {
    /// A frame-relative stack slot. Slot 0 holds the function value itself
    Slot
}

byte_param! {
    /// An index into the upvalue list of the running closure
    UpSlot
}

byte_param! {
    /// The number of arguments of a call
    Argc
}

/// A relative jump distance, measured from the end of the jump instruction.
/// Encoded big-endian so a placeholder can be patched in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rel(pub u16);

impl Display for Rel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl IParamType for Rel {
    const PARAM_ENUM_TY: ParamType = ParamType::Rel;

    fn parse(mut r: impl Buf) -> Self {
        Rel(r.get_u16())
    }

    fn write(&self, mut w: impl BufMut) {
        w.put_u16(self.0)
    }
}
