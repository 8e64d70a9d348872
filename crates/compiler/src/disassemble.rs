//! Human-readable chunk dump, for `lattice-cli`'s `--disassemble` flag and
//! for eyeballing lowering output in tests — grounded on the teacher's own
//! `compiler::codegen::debug` instruction-printer, which walks generated IR
//! the same linear way this walks a `Chunk`'s `code`.

use std::fmt::Write as _;

use crate::chunk::{Chunk, FunctionProto};

pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {name} ==");
    disassemble_code(chunk, &mut out);

    for (i, proto) in chunk.functions.iter().enumerate() {
        disassemble_function(proto, i as u32, &mut out);
    }
    out
}

fn disassemble_function(proto: &FunctionProto, index: u32, out: &mut String) {
    let _ = writeln!(out, "== fn {index} <{}> (arity {}, slots {}) ==", proto.name, proto.arity, proto.slot_count);
    disassemble_code(&proto.chunk, out);
    for (i, nested) in proto.chunk.functions.iter().enumerate() {
        disassemble_function(nested, i as u32, out);
    }
}

fn disassemble_code(chunk: &Chunk, out: &mut String) {
    for (i, op) in chunk.code.iter().enumerate() {
        let line = chunk.lines.line_for(i as u32).unwrap_or(0);
        let _ = writeln!(out, "{i:>6}  L{line:<4} {op:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn disassembly_lists_every_instruction_with_its_index() {
        let mut chunk = Chunk::new();
        chunk.emit(OpCode::Nil, 1);
        chunk.emit(OpCode::Halt, 2);
        let text = disassemble_chunk(&chunk, "test");
        assert!(text.contains("Nil"));
        assert!(text.contains("Halt"));
        assert!(text.contains("== test =="));
    }
}
