use std::io;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("bin is full")]
    BinFull,

    #[error("buffer at offset {pointer} (element {element_index}) could not be released")]
    ReleaseBuffer { pointer: usize, element_index: u32 },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("unknown collection: {0}")]
    MissingCollection(String),

    #[error("slot ring saturated")]
    SlotRingSaturated,

    #[error("output buffer overflow")]
    OutputOverflow,

    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Locks `mutex`, turning poisoning (a prior panic while holding the lock)
/// into an [`EngineError::Internal`] instead of propagating the panic.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| {
        error!("engine lock poisoned - fatal error");
        EngineError::Internal("engine lock poisoned - fatal error".into())
    })
}
