use bytes::BufMut;

use inst::{IParamType, Inst};

pub mod debug;
pub mod inst;
pub mod obj;
pub mod table;
pub mod value;


pub use obj::{Heap, Obj, ObjRef};
pub use value::Val;

/// A unit of compiled code: the instruction stream of one function, its
/// constant table, and the source line of every emitted byte.
#[derive(Debug, Default)]
pub struct Chunk {
    pub code: Vec<u8>,
    pub constants: Vec<Val>,
    lines: Vec<LineRun>,
}

/// A run of consecutive bytes sharing one source line. Emission order makes
/// runs long, so this stays far smaller than one entry per byte.
#[derive(Debug, Clone, Copy)]
struct LineRun {
    line: u32,
    len: u32,
}

impl Chunk {
    pub fn new() -> Chunk {
        Chunk::default()
    }

    /// Append one byte, recording the source line it came from.
    pub fn write_u8(&mut self, byte: u8, line: u32) {
        self.code.put_u8(byte);
        self.push_line(line);
    }

    /// Append an instruction without params.
    pub fn emit(&mut self, i: Inst, line: u32) {
        self.write_u8(i.ordinal(), line);
    }

    /// Append an instruction together with its param.
    pub fn emit_p(&mut self, i: Inst, p: impl IParamType, line: u32) {
        let start = self.code.len();
        self.code.put_u8(i.ordinal());
        p.write(&mut self.code);
        for _ in start..self.code.len() {
            self.push_line(line);
        }
    }

    /// Overwrite the two bytes at `at` with `v`. Used to backpatch jump
    /// distances once the target is known.
    pub fn patch_u16(&mut self, at: usize, v: u16) {
        self.code[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }

    /// Append `v` to the constant table and return its index.
    pub fn add_constant(&mut self, v: Val) -> usize {
        self.constants.push(v);
        self.constants.len() - 1
    }

    /// The source line of the byte at `offset`. Offsets past the end report
    /// the last recorded line.
    pub fn line_at(&self, offset: usize) -> u32 {
        let mut covered = 0usize;
        for run in &self.lines {
            covered += run.len as usize;
            if offset < covered {
                return run.line;
            }
        }
        self.lines.last().map(|run| run.line).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    fn push_line(&mut self, line: u32) {
        match self.lines.last_mut() {
            Some(run) if run.line == line => run.len += 1,
            _ => self.lines.push(LineRun { line, len: 1 }),
        }
    }
}
