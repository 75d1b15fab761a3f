use std::rc::Rc;

use bytes::Buf;

use basalt_bytecode::inst::InstContainer;
use basalt_bytecode::obj::Function;
use basalt_bytecode::ObjRef;

/// One call's execution state. The frame doubles as the instruction cursor:
/// it implements [`Buf`] and [`InstContainer`] over its function's chunk, so
/// the dispatch loop reads instructions and parameters straight off it.
pub(crate) struct Frame {
    /// The closure being executed.
    pub closure: ObjRef,
    /// The closure's function, held directly so chunk access skips the heap.
    pub fun: Rc<Function>,
    pub ip: usize,
    /// Stack index of this frame's slot 0, which holds the callee itself.
    /// Locals live at `base + slot`.
    pub base: usize,
}

impl Frame {
    pub fn new(closure: ObjRef, fun: Rc<Function>, base: usize) -> Frame {
        Frame {
            closure,
            fun,
            ip: 0,
            base,
        }
    }

    /// Source line of the most recently read instruction. The read head has
    /// already moved past it, hence the step back.
    pub fn current_line(&self) -> u32 {
        self.fun.chunk.line_at(self.ip.saturating_sub(1))
    }
}

impl Buf for Frame {
    fn remaining(&self) -> usize {
        self.fun.chunk.code.len() - self.ip
    }

    fn chunk(&self) -> &[u8] {
        &self.fun.chunk.code[self.ip..]
    }

    fn advance(&mut self, cnt: usize) {
        self.ip += cnt
    }
}

impl InstContainer for Frame {
    fn seek(&mut self, position: usize) {
        self.ip = position
    }

    fn position(&self) -> usize {
        self.ip
    }
}
