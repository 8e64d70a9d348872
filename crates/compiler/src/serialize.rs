//! On-disk bytecode format (spec §6.2): a magic tag and version header
//! followed by a `bincode`-encoded `Chunk`, grounded directly on the
//! teacher's `runtime::serialize` `to_bytes`/`from_bytes` pair over
//! `bincode`, applied here to a whole `Chunk` instead of a single `Value`.

use lattice_core::{LatticeError, Result};

use crate::chunk::Chunk;

const MAGIC: &[u8; 4] = b"LTCB";
const VERSION: u16 = 1;

pub fn to_bytes(chunk: &Chunk) -> Result<Vec<u8>> {
    let body = bincode::serialize(chunk).map_err(|e| LatticeError::IoError { message: e.to_string() })?;
    let mut out = Vec::with_capacity(4 + 2 + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn from_bytes(bytes: &[u8]) -> Result<Chunk> {
    if bytes.len() < 6 {
        return Err(LatticeError::IoError { message: "bytecode file is too short to contain a header".to_string() });
    }
    let (header, body) = bytes.split_at(6);
    let (magic, version_bytes) = header.split_at(4);
    if magic != MAGIC {
        return Err(LatticeError::IoError { message: "not a Lattice bytecode file (bad magic)".to_string() });
    }
    let version = u16::from_le_bytes([version_bytes[0], version_bytes[1]]);
    if version != VERSION {
        return Err(LatticeError::IoError { message: format!("unsupported bytecode version {version}") });
    }
    bincode::deserialize(body).map_err(|e| LatticeError::IoError { message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::OpCode;

    #[test]
    fn a_chunk_round_trips_through_bytes() {
        let mut chunk = Chunk::new();
        chunk.emit(OpCode::Nil, 1);
        chunk.emit(OpCode::Halt, 1);
        let bytes = to_bytes(&chunk).unwrap();
        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded.code.len(), chunk.code.len());
    }

    #[test]
    fn a_bad_magic_is_rejected() {
        let bytes = vec![0u8; 16];
        assert!(from_bytes(&bytes).is_err());
    }

    #[test]
    fn a_truncated_header_is_rejected() {
        assert!(from_bytes(&[1, 2, 3]).is_err());
    }
}
