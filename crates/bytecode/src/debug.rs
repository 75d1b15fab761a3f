//! Human-readable rendering of compiled chunks, for the `--dump-bytecode`
//! CLI mode and the VM's instruction trace.

use std::fmt::{self, Display};

use bytes::Buf;

use crate::inst::{Argc, ConstIdx, Inst, InstContainer, ParamType, Rel, Slot, UpSlot};
use crate::obj::Heap;
use crate::{Chunk, Val};

/// A read cursor over a finished instruction stream.
struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(code: &'a [u8]) -> Cursor<'a> {
        Cursor { code, pos: 0 }
    }
}

impl Buf for Cursor<'_> {
    fn remaining(&self) -> usize {
        self.code.len() - self.pos
    }

    fn chunk(&self) -> &[u8] {
        &self.code[self.pos..]
    }

    fn advance(&mut self, cnt: usize) {
        self.pos += cnt;
    }
}

impl InstContainer for Cursor<'_> {
    fn seek(&mut self, position: usize) {
        self.pos = position;
    }

    fn position(&self) -> usize {
        self.pos
    }
}

/// Renders a whole chunk, one instruction per line, with a `== name ==`
/// header. Obtained from [`disassemble`].
pub struct ChunkDisassembly<'a> {
    chunk: &'a Chunk,
    heap: &'a Heap,
    name: &'a str,
}

pub fn disassemble<'a>(chunk: &'a Chunk, heap: &'a Heap, name: &'a str) -> ChunkDisassembly<'a> {
    ChunkDisassembly { chunk, heap, name }
}

impl Display for ChunkDisassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.name)?;
        let mut cursor = Cursor::new(&self.chunk.code);
        while cursor.has_remaining() {
            let at = cursor.position();
            write!(f, "{:04} ", at)?;
            if at > 0 && self.chunk.line_at(at) == self.chunk.line_at(at - 1) {
                write!(f, "   | ")?;
            } else {
                write!(f, "{:>4} ", self.chunk.line_at(at))?;
            }
            fmt_inst(f, self.chunk, self.heap, &mut cursor)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Renders the single instruction at `offset`, prefixed with the offset.
pub struct InstDisassembly<'a> {
    chunk: &'a Chunk,
    heap: &'a Heap,
    offset: usize,
}

pub fn inst_at<'a>(chunk: &'a Chunk, heap: &'a Heap, offset: usize) -> InstDisassembly<'a> {
    InstDisassembly {
        chunk,
        heap,
        offset,
    }
}

impl Display for InstDisassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cursor = Cursor::new(&self.chunk.code);
        cursor.seek(self.offset);
        write!(f, "{:04} ", self.offset)?;
        fmt_inst(f, self.chunk, self.heap, &mut cursor)
    }
}

/// Write one instruction (without offset or line prefix), advancing the
/// cursor past it, including any trailing upvalue descriptors.
fn fmt_inst(
    f: &mut fmt::Formatter<'_>,
    chunk: &Chunk,
    heap: &Heap,
    cursor: &mut Cursor<'_>,
) -> fmt::Result {
    let byte = cursor.get_u8();
    let inst = match Inst::from_ordinal(byte) {
        Some(inst) => inst,
        None => return write!(f, "Unknown opcode {}", byte),
    };
    let param = match inst.param_type() {
        Some(p) => p,
        None => return write!(f, "{}", inst),
    };
    if cursor.remaining() < param.width() {
        return write!(f, "{:<16} (truncated)", inst);
    }
    match param {
        ParamType::ConstIdx => {
            let idx = cursor.read_param::<ConstIdx>();
            write!(f, "{:<16} {:>4} '", inst, idx.0)?;
            match chunk.constants.get(idx.0 as usize) {
                Some(v) => write!(f, "{}", heap.show(*v))?,
                None => write!(f, "??")?,
            }
            write!(f, "'")?;
            if inst == Inst::ClosureNew {
                fmt_captures(f, chunk, heap, cursor, idx)?;
            }
            Ok(())
        }
        ParamType::Slot => {
            let slot = cursor.read_param::<Slot>();
            write!(f, "{:<16} {:>4}", inst, slot.0)
        }
        ParamType::UpSlot => {
            let slot = cursor.read_param::<UpSlot>();
            write!(f, "{:<16} {:>4}", inst, slot.0)
        }
        ParamType::Argc => {
            let n = cursor.read_param::<Argc>();
            write!(f, "{:<16} {:>4}", inst, n.0)
        }
        ParamType::Rel => {
            let off = cursor.read_param::<Rel>();
            let after = cursor.position();
            let target = if inst == Inst::Loop {
                after.saturating_sub(off.0 as usize)
            } else {
                after + off.0 as usize
            };
            write!(f, "{:<16} {:>4} -> {}", inst, off.0, target)
        }
    }
}

/// The `(is_local, index)` byte pairs following a `ClosureNew`, one line
/// each in the style of the main listing.
fn fmt_captures(
    f: &mut fmt::Formatter<'_>,
    chunk: &Chunk,
    heap: &Heap,
    cursor: &mut Cursor<'_>,
    idx: ConstIdx,
) -> fmt::Result {
    let count = match chunk.constants.get(idx.0 as usize) {
        Some(Val::Obj(r)) => heap.as_fun(*r).map(|fun| fun.upvalue_count).unwrap_or(0),
        _ => 0,
    };
    for _ in 0..count {
        if cursor.remaining() < 2 {
            return write!(f, " (truncated)");
        }
        let at = cursor.position();
        let is_local = cursor.get_u8();
        let index = cursor.get_u8();
        let what = if is_local != 0 { "local" } else { "upvalue" };
        write!(f, "\n{:04}      |                     {} {}", at, what, index)?;
    }
    Ok(())
}
