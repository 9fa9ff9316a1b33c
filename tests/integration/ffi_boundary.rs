//! Exercises the C-callable boundary from outside the crate: a full
//! insert/find/aggregate round trip through the `extern "C"` entry points,
//! plus the wrong-collection release scenario (S5).
#![allow(unsafe_code)]

use std::ffi::{c_void, CString};

use sombra::atom::{AccOp, Atom, Operator, TypeTag, ATOM_BYTES};
use sombra::ffi::{acquire_insert_buffer, initialize, query_aggregate, query_find, release_insert_buffer};

fn ensure_initialized() {
    initialize(64, 1024, 1024 * 1024, 64, std::ptr::null());
}

#[test]
fn s5_release_against_the_wrong_collection_or_an_unknown_pointer_is_rejected() {
    ensure_initialized();
    let collection_a = CString::new("ffi_collection_a").unwrap();
    let collection_b = CString::new("ffi_collection_b").unwrap();

    let atoms = [Atom::new(0, 10, TypeTag::Int64, 8, 1)];
    let size_bytes = atoms.len() as u32 * ATOM_BYTES;
    let ptr = acquire_insert_buffer(0, collection_a.as_ptr(), size_bytes);
    assert!(!ptr.is_null());
    unsafe {
        std::ptr::copy_nonoverlapping(atoms.as_ptr(), ptr as *mut Atom, atoms.len());
    }

    // releasing a buffer reserved for "a" while naming "b" is rejected.
    assert!(!release_insert_buffer(0, collection_b.as_ptr(), ptr));

    // an arbitrary pointer never handed out by acquire_insert_buffer is
    // rejected too, regardless of collection name.
    assert!(!release_insert_buffer(0, collection_a.as_ptr(), 0xdead_beef as *mut c_void));
}

#[test]
fn insert_find_and_aggregate_round_trip_through_the_c_boundary() {
    ensure_initialized();
    let name = CString::new("ffi_round_trip").unwrap();

    for i in 0..20u64 {
        let atoms = [
            Atom::new(0, 50, TypeTag::Int64, 8, 1), // group
            Atom::new(0, 51, TypeTag::Int64, 8, i), // value
        ];
        let size_bytes = atoms.len() as u32 * ATOM_BYTES;
        let ptr = acquire_insert_buffer(0, name.as_ptr(), size_bytes);
        assert!(!ptr.is_null());
        unsafe {
            std::ptr::copy_nonoverlapping(atoms.as_ptr(), ptr as *mut Atom, atoms.len());
        }
        assert!(release_insert_buffer(0, name.as_ptr(), ptr));
    }

    let filter = Atom::new(0, 51, TypeTag::Int64, 8, 19);
    let mut lft_bytes = Vec::new();
    lft_bytes.extend_from_slice(&0u32.to_le_bytes());
    lft_bytes.extend_from_slice(&(Operator::Eq as u32).to_le_bytes());
    lft_bytes.extend_from_slice(&filter.to_le_bytes());

    let mut out_buf = vec![0u8; 4096];
    let count = query_find(
        0,
        name.as_ptr(),
        std::ptr::null(),
        0,
        lft_bytes.as_ptr(),
        lft_bytes.len() as u32,
        std::ptr::null(),
        0,
        out_buf.as_mut_ptr(),
        out_buf.len() as u32,
    );
    assert!(count > 0);

    let mut query_bytes = Vec::new();
    query_bytes.extend_from_slice(&50u32.to_le_bytes()); // group name
    query_bytes.extend_from_slice(&99u32.to_le_bytes()); // target name
    query_bytes.extend_from_slice(&51u32.to_le_bytes()); // value name
    query_bytes.extend_from_slice(&(AccOp::Sum as u32).to_le_bytes());

    let mut agg_out = vec![0u8; 4096];
    let agg_count = query_aggregate(
        0,
        name.as_ptr(),
        query_bytes.as_ptr(),
        query_bytes.len() as u32,
        agg_out.as_mut_ptr(),
        agg_out.len() as u32,
        0,
    );
    assert!(agg_count > 0);
}

#[test]
fn query_find_against_an_unknown_collection_returns_zero_not_a_panic() {
    ensure_initialized();
    let name = CString::new("ffi_never_created").unwrap();
    let mut out_buf = vec![0u8; 64];
    let count = query_find(
        0,
        name.as_ptr(),
        std::ptr::null(),
        0,
        std::ptr::null(),
        0,
        std::ptr::null(),
        0,
        out_buf.as_mut_ptr(),
        out_buf.len() as u32,
    );
    assert_eq!(count, 0);
}
