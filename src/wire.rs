//! Decoders for the flat byte-buffer formats crossing the FFI boundary:
//! `LFTraw` (one comparison leaf), `QPraw` (one predicate-tree node), and
//! `Aggr1` (one aggregation target). All multi-byte fields are little-endian.

use crate::atom::Atom;
use crate::error::{EngineError, Result};

pub const LFT_RAW_SIZE: usize = 24;
pub const QP_RAW_SIZE: usize = 8;
pub const AGGR1_SIZE: usize = 12;

/// One decoded `LFTraw` record: a comparison operator plus its filter atom,
/// tagged with the leaf index the caller wants matches reported under.
#[derive(Debug, Clone, Copy)]
pub struct LftRaw {
    pub idx: u32,
    pub op: u32,
    pub filter: Atom,
}

pub fn decode_lft_records(bytes: &[u8]) -> Result<Vec<LftRaw>> {
    if bytes.len() % LFT_RAW_SIZE != 0 {
        return Err(EngineError::MalformedQuery(format!(
            "LFT buffer length {} is not a multiple of {LFT_RAW_SIZE}",
            bytes.len()
        )));
    }
    bytes
        .chunks_exact(LFT_RAW_SIZE)
        .map(|chunk| {
            let idx = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let op = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            let atom_bytes: [u8; 16] = chunk[8..24].try_into().unwrap();
            Ok(LftRaw {
                idx,
                op,
                filter: Atom::from_le_bytes(&atom_bytes),
            })
        })
        .collect()
}

pub fn decode_qp_records(bytes: &[u8]) -> Result<Vec<(u32, u32)>> {
    if bytes.len() % QP_RAW_SIZE != 0 {
        return Err(EngineError::MalformedQuery(format!(
            "QP buffer length {} is not a multiple of {QP_RAW_SIZE}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(QP_RAW_SIZE)
        .map(|chunk| {
            let command = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let kids = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            (command, kids)
        })
        .collect())
}

/// One decoded `Aggr1` record: a target field, its source value field, and
/// the accumulator operator to fold it with.
#[derive(Debug, Clone, Copy)]
pub struct Aggr1 {
    pub target_name: u32,
    pub acc_name: u32,
    pub op: u32,
}

pub fn decode_aggr1_records(bytes: &[u8]) -> Result<Vec<Aggr1>> {
    if bytes.len() % AGGR1_SIZE != 0 {
        return Err(EngineError::MalformedQuery(format!(
            "Aggr1 buffer length {} is not a multiple of {AGGR1_SIZE}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(AGGR1_SIZE)
        .map(|chunk| Aggr1 {
            target_name: u32::from_le_bytes(chunk[0..4].try_into().unwrap()),
            acc_name: u32::from_le_bytes(chunk[4..8].try_into().unwrap()),
            op: u32::from_le_bytes(chunk[8..12].try_into().unwrap()),
        })
        .collect())
}

/// Decodes the group name that prefixes an aggregate query's `Aggr1` array.
pub fn decode_group_name(bytes: &[u8]) -> Result<(u32, &[u8])> {
    if bytes.len() < 4 {
        return Err(EngineError::MalformedQuery(
            "aggregate query buffer shorter than the group-name prefix".into(),
        ));
    }
    let name = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
    Ok((name, &bytes[4..]))
}
