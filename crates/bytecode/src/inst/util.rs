use bytes::Buf;

use crate::inst::Inst;

use super::param;

/// A positional reader over an instruction stream. Implemented by the VM's
/// call frame and by the disassembler's cursor.
pub trait InstContainer: Buf {
    /// Move the read head to `position`
    fn seek(&mut self, position: usize);

    /// Current read head offset from the start of the stream
    fn position(&self) -> usize;

    /// Decode the instruction byte at the read head. Returns `None` on bytes
    /// that are not instructions.
    fn read_inst(&mut self) -> Option<Inst>
    where
        Self: Sized,
    {
        Inst::from_ordinal(self.get_u8())
    }

    fn read_param<T: param::IParamType>(&mut self) -> T
    where
        Self: Sized,
    {
        T::parse(self)
    }
}
