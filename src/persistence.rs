//! On-disk bin checkpoint format: a fixed header (with its total-size field
//! back-patched once the payload length is known), the published element
//! headers, then the raw atom blob. Little-endian throughout, matching the
//! wire format the FFI layer already speaks.
//!
//! This module is reached only from [`crate::collection::Collection`]'s
//! optional checkpoint/reload path and the CLI/FFI layers; the core query
//! pipeline never calls into it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::atom::{Atom, ATOM_BYTES};
use crate::bin::{Bin, ElemState};
use crate::error::{EngineError, Result};

const HEADER_SIZE: usize = 8 + 4 + 8 + 4 + 4 + 8 + 8;

/// Writes `bin`'s published elements to `path`, overwriting any existing
/// file there. The atom blob covers only the published prefix of the
/// arena — `byte_size` in the header is that prefix's length, not the bin's
/// full capacity.
pub fn serialize_bin(bin: &Bin, path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).truncate(true).open(path)?;

    let headers = bin.headers_snapshot();
    let elems_used = headers.len() as u32;
    let atoms_used = headers.last().map(|(offset, length, _)| offset + length).unwrap_or(0);
    let byte_size = atoms_used as u64 * ATOM_BYTES as u64;
    let num_active = bin.num_active();
    let num_deleted = headers.iter().filter(|(_, _, status)| *status == ElemState::Forgotten).count() as u64;

    file.write_all(&0u64.to_le_bytes())?; // total_size placeholder, back-patched below
    file.write_all(&bin.index().to_le_bytes())?;
    file.write_all(&byte_size.to_le_bytes())?;
    file.write_all(&elems_used.to_le_bytes())?;
    file.write_all(&bin.elem_capacity().to_le_bytes())?;
    file.write_all(&num_active.to_le_bytes())?;
    file.write_all(&num_deleted.to_le_bytes())?;

    for (offset, length, status) in &headers {
        let packed = *offset as u64 | ((*length as u64) << 32) | ((*status as u8 as u64) << 56);
        file.write_all(&packed.to_le_bytes())?;
    }

    let raw = bin.raw_snapshot();
    for atom in &raw[..atoms_used as usize] {
        file.write_all(&atom.to_le_bytes())?;
    }

    let total_size = file.stream_position()?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&total_size.to_le_bytes())?;
    Ok(())
}

/// Reconstructs a [`Bin`] from a file written by [`serialize_bin`], replaying
/// each published element through the normal `acquire_buffer`/`write_elem`/
/// `release_buffer` path so offsets are rebuilt exactly as the live bin
/// would have assigned them.
pub fn deserialize_bin(path: &Path) -> Result<Bin> {
    let mut file = File::open(path)?;

    let mut header = [0u8; HEADER_SIZE];
    file.read_exact(&mut header)?;
    let bin_index = u32::from_le_bytes(header[8..12].try_into().unwrap());
    let byte_size = u64::from_le_bytes(header[12..20].try_into().unwrap());
    let elems_used = u32::from_le_bytes(header[20..24].try_into().unwrap());
    let elems_capacity = u32::from_le_bytes(header[24..28].try_into().unwrap());

    let mut packed_headers = vec![0u8; elems_used as usize * 8];
    file.read_exact(&mut packed_headers)?;
    let headers: Vec<(u32, u32, u8)> = packed_headers
        .chunks_exact(8)
        .map(|chunk| {
            let packed = u64::from_le_bytes(chunk.try_into().unwrap());
            let offset = packed as u32;
            let length = ((packed >> 32) & 0x00FF_FFFF) as u32;
            let status = (packed >> 56) as u8;
            (offset, length, status)
        })
        .collect();

    let atoms_used = (byte_size / ATOM_BYTES as u64) as usize;
    let mut atom_bytes = vec![0u8; atoms_used * 16];
    file.read_exact(&mut atom_bytes)?;
    let atoms: Vec<Atom> = atom_bytes
        .chunks_exact(16)
        .map(|chunk| Atom::from_le_bytes(chunk.try_into().unwrap()))
        .collect();

    // +1: acquire_buffer rejects a reservation that would reach the arena's
    // last atom exactly, so the capacity must exceed the replayed atom count.
    let bin = Bin::new(bin_index, atoms_used.max(1) as u32 + 1, elems_capacity);
    for (offset, length, status) in headers {
        let elem_idx = bin.acquire_buffer(length).map_err(|_| {
            EngineError::Internal("reloaded bin could not replay its own recorded elements".into())
        })?;
        bin.write_elem(elem_idx, &atoms[offset as usize..(offset + length) as usize]);
        bin.release_buffer(elem_idx)?;
        if status == ElemState::Forgotten as u8 {
            bin.disable_element(elem_idx);
        }
    }
    Ok(bin)
}
