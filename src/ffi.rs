//! The flat, C-callable boundary: five `extern "C"` entry points wrapping the
//! safe library API. Every function catches panics at its own boundary and
//! returns the documented sentinel (null, `false`, or `0`) rather than
//! unwinding or propagating a `Result` across FFI.

#![allow(unsafe_code)]

use std::collections::HashMap;
use std::os::raw::{c_char, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::ptr;
use std::sync::{Mutex, OnceLock};

use tracing::error;

use crate::atom::{Atom, Operator, ATOM_BYTES, ID_NAME};
use crate::chore::CancellationToken;
use crate::config::EngineConfig;
use crate::driver::QueryDriver;
use crate::leaf::{AggregateLeaf, FindLeaf};
use crate::metrics::QueryMetrics;
use crate::predicate_tree::PredicateTree;
use crate::registry::CollectionRegistry;
use crate::wire;

struct Engine {
    registry: CollectionRegistry,
    config: EngineConfig,
    driver: QueryDriver,
    /// Maps an outstanding insert-buffer pointer back to the collection and
    /// element it was reserved for, so `release_insert_buffer` can resolve a
    /// bare pointer into a `release_buffer` call.
    outstanding: Mutex<HashMap<usize, (String, u32, u32)>>,
}

static ENGINE: OnceLock<Engine> = OnceLock::new();

fn engine() -> Option<&'static Engine> {
    ENGINE.get()
}

unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    std::ffi::CStr::from_ptr(ptr).to_str().ok().map(str::to_owned)
}

unsafe fn read_bytes<'a>(ptr: *const u8, len: u32) -> Option<&'a [u8]> {
    if ptr.is_null() && len != 0 {
        return None;
    }
    if len == 0 {
        return Some(&[]);
    }
    Some(std::slice::from_raw_parts(ptr, len as usize))
}

fn log_panic(function: &str, payload: Box<dyn std::any::Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    error!(function, message, "panicked across the FFI boundary");
}

/// Initializes process-wide engine state. Subsequent calls are no-ops, same
/// as `tracing_subscriber`'s idempotent init — first call wins.
#[no_mangle]
pub extern "C" fn initialize(
    max_concurrent_inserts: u32,
    bin_max_elems: u32,
    bin_max_bytes: u64,
    max_bins: u32,
    data_path: *const c_char,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: `data_path` is a caller-owned NUL-terminated string or null.
        let data_path: Option<PathBuf> = unsafe { read_c_string(data_path) }.map(PathBuf::from);
        let config = EngineConfig {
            max_concurrent_inserts,
            bin_max_elems,
            bin_max_bytes,
            max_bins,
            data_path,
            ..EngineConfig::default()
        };
        let _ = ENGINE.set(Engine {
            registry: CollectionRegistry::new(),
            driver: QueryDriver::new(config.clone()),
            config,
            outstanding: Mutex::new(HashMap::new()),
        });
    }));
    if let Err(payload) = outcome {
        log_panic("initialize", payload);
    }
}

/// Reserves room for `size_bytes` in `collection_name`'s tail bin and
/// returns a pointer the caller may write atoms into directly. Returns null
/// on any failure (uninitialized engine, bad collection name, bin full).
///
/// `_candle` is the caller's opaque client handle; this engine has no
/// per-client session state, so it is accepted but otherwise unused.
#[no_mangle]
pub extern "C" fn acquire_insert_buffer(_candle: u64, collection_name: *const c_char, size_bytes: u32) -> *mut c_void {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Option<*mut c_void> {
        let engine = engine()?;
        // SAFETY: caller-owned NUL-terminated string.
        let name = unsafe { read_c_string(collection_name) }?;
        let size_atoms = size_bytes / ATOM_BYTES;
        let collection = engine.registry.get_or_create(&name, &engine.config);
        let (bin_idx, elem_idx) = collection.acquire_insert_buffer(size_atoms).ok()?;
        let bin = collection.bins_snapshot().into_iter().nth(bin_idx as usize)?;
        let offset = bin.reserved_offset(elem_idx)?;
        // SAFETY: `offset` is the range this call itself just reserved.
        let ptr = unsafe { bin.atom_ptr_mut(offset) };
        crate::error::acquire_lock(&engine.outstanding).ok()?.insert(ptr as usize, (name, bin_idx, elem_idx));
        Some(ptr as *mut c_void)
    }));
    match outcome {
        Ok(Some(ptr)) => ptr,
        Ok(None) => ptr::null_mut(),
        Err(payload) => {
            log_panic("acquire_insert_buffer", payload);
            ptr::null_mut()
        }
    }
}

/// Releases a buffer previously handed out by `acquire_insert_buffer`,
/// making the written element visible to scans. Returns `false` if
/// `pointer` is not a currently outstanding buffer for `collection_name`.
#[no_mangle]
pub extern "C" fn release_insert_buffer(_candle: u64, collection_name: *const c_char, pointer: *mut c_void) -> bool {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> bool {
        let Some(engine) = engine() else { return false };
        // SAFETY: caller-owned NUL-terminated string.
        let Some(name) = (unsafe { read_c_string(collection_name) }) else {
            return false;
        };
        let Ok(mut outstanding) = crate::error::acquire_lock(&engine.outstanding) else {
            return false;
        };
        let Some((recorded_name, bin_idx, elem_idx)) = outstanding.remove(&(pointer as usize)) else {
            return false;
        };
        drop(outstanding);
        if recorded_name != name {
            return false;
        }
        let Ok(collection) = engine.registry.get(&name) else {
            return false;
        };
        let bins = collection.bins_snapshot();
        let Some(bin) = bins.get(bin_idx as usize) else {
            return false;
        };
        bin.release_buffer(elem_idx).is_ok()
    }));
    match outcome {
        Ok(v) => v,
        Err(payload) => {
            log_panic("release_insert_buffer", payload);
            false
        }
    }
}

/// Runs a "find" query and writes its atom output into `out_buf`
/// (`out_buf_len` bytes). `selector_bytes` is a packed array of `u32` field
/// names (the projection set; empty means project every field);
/// `lft_bytes`/`qp_bytes` are the `LFTraw`/`QPraw` sequences from §6.
/// Returns the number of atoms written, or `0` on any failure.
#[no_mangle]
pub extern "C" fn query_find(
    _candle: u64,
    collection_name: *const c_char,
    selector_bytes: *const u8,
    selector_len: u32,
    lft_bytes: *const u8,
    lft_len: u32,
    qp_bytes: *const u8,
    qp_len: u32,
    out_buf: *mut u8,
    out_buf_len: u32,
) -> u32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Option<u32> {
        let engine = engine()?;
        // SAFETY: each pointer/len pair is a caller-owned buffer of that length.
        let name = unsafe { read_c_string(collection_name) }?;
        let selector = unsafe { read_bytes(selector_bytes, selector_len) }?;
        let lft = unsafe { read_bytes(lft_bytes, lft_len) }?;
        let qp = unsafe { read_bytes(qp_bytes, qp_len) }?;

        let collection = engine.registry.get(&name).ok()?;

        let projection = if selector.is_empty() {
            None
        } else {
            Some(
                selector
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
                    .collect(),
            )
        };

        let records = wire::decode_lft_records(lft).ok()?;
        let leaves: Vec<FindLeaf> = records
            .into_iter()
            .map(|r| Operator::try_from(r.op).map(|op| FindLeaf::new(r.idx, op, r.filter)))
            .collect::<crate::error::Result<_>>()
            .ok()?;

        let qp_records = wire::decode_qp_records(qp).ok()?;
        let tree = PredicateTree::from_wire(&qp_records).ok()?;

        let cancel = CancellationToken::new();
        let metrics = QueryMetrics::new();
        let result = engine.driver.find(&collection, leaves, tree, projection, &cancel, &metrics).ok()?;

        let needed = result.len() * ATOM_BYTES as usize;
        if needed > out_buf_len as usize || out_buf.is_null() {
            return None;
        }
        // SAFETY: `out_buf` is caller-owned and at least `needed` bytes, just checked.
        unsafe {
            ptr::copy_nonoverlapping(result.as_ptr() as *const u8, out_buf, needed);
        }
        Some(result.len() as u32)
    }));
    match outcome {
        Ok(Some(count)) => count,
        Ok(None) => 0,
        Err(payload) => {
            log_panic("query_find", payload);
            0
        }
    }
}

/// Runs an "aggregate" query and writes its atom output into `out_buf`.
/// `query_bytes` is a 4-byte group field name followed by an `Aggr1` array
/// (§6). `sort_flag != 0` sorts rows ascending by the first target. Returns
/// the number of atoms written, or `0` on any failure.
#[no_mangle]
pub extern "C" fn query_aggregate(
    _candle: u64,
    collection_name: *const c_char,
    query_bytes: *const u8,
    query_len: u32,
    out_buf: *mut u8,
    out_buf_len: u32,
    sort_flag: u32,
) -> u32 {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Option<u32> {
        let engine = engine()?;
        // SAFETY: caller-owned buffer of `query_len` bytes.
        let name = unsafe { read_c_string(collection_name) }?;
        let query = unsafe { read_bytes(query_bytes, query_len) }?;
        let collection = engine.registry.get(&name).ok()?;

        let (group_name, rest) = wire::decode_group_name(query).ok()?;
        let records = wire::decode_aggr1_records(rest).ok()?;

        let mut leaves = Vec::with_capacity(records.len());
        let mut targets = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            let op = crate::atom::AccOp::try_from(record.op).ok()?;
            leaves.push(AggregateLeaf::new(idx as u32, group_name, record.acc_name, op));
            targets.push(crate::aggregate_output::AggregateTarget {
                leaf_index: idx as u32,
                target_name: record.target_name,
                op,
            });
        }

        let cancel = CancellationToken::new();
        let metrics = QueryMetrics::new();
        let result = engine
            .driver
            .aggregate(&collection, leaves, targets, sort_flag != 0, &cancel, &metrics)
            .ok()?;

        let needed = result.len() * ATOM_BYTES as usize;
        if needed > out_buf_len as usize || out_buf.is_null() {
            return None;
        }
        // SAFETY: `out_buf` is caller-owned and at least `needed` bytes, just checked.
        unsafe {
            ptr::copy_nonoverlapping(result.as_ptr() as *const u8, out_buf, needed);
        }
        Some(result.len() as u32)
    }));
    match outcome {
        Ok(Some(count)) => count,
        Ok(None) => 0,
        Err(payload) => {
            log_panic("query_aggregate", payload);
            0
        }
    }
}

// `ID_NAME` is re-exported for bindings that need to build a projection
// selector suppressing/including the implicit identifier field.
pub use crate::atom::ID_NAME as IMPLICIT_ID_FIELD;
