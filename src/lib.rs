//! # An in-memory document query engine
//!
//! This crate answers two families of queries over appended, semi-structured
//! records: boolean predicate matching with optional field projection
//! ("find"), and group-by aggregation over numeric fields ("aggregate").
//! Records are packed into fixed-width 128-bit [`atom::Atom`]s; a document is
//! a contiguous run of atoms terminated by an invalid sentinel. Collections
//! are partitioned into fixed-size append-only shards (bins); queries
//! execute concurrently across bins and across predicates.
//!
//! ## Quick start
//!
//! ```rust
//! use sombra::atom::{Atom, Operator, TypeTag};
//! use sombra::chore::CancellationToken;
//! use sombra::collection::Collection;
//! use sombra::config::EngineConfig;
//! use sombra::driver::QueryDriver;
//! use sombra::leaf::FindLeaf;
//! use sombra::metrics::QueryMetrics;
//! use sombra::predicate_tree::PredicateTree;
//!
//! let collection = Collection::new("widgets", EngineConfig::small());
//! let (bin_idx, elem_idx) = collection.acquire_insert_buffer(1)?;
//! collection.write_and_release(bin_idx, elem_idx, &[Atom::new(0, 10, TypeTag::Int64, 8, 42)])?;
//!
//! let driver = QueryDriver::new(EngineConfig::small());
//! let leaf = FindLeaf::new(0, Operator::Eq, Atom::new(0, 10, TypeTag::Int64, 8, 42));
//! let out = driver.find(
//!     &collection,
//!     vec![leaf],
//!     PredicateTree::Trivial,
//!     None,
//!     &CancellationToken::new(),
//!     &QueryMetrics::new(),
//! )?;
//! assert_eq!(out[0].value(), 1);
//! # Ok::<(), sombra::error::EngineError>(())
//! ```
//!
//! ## Architecture
//!
//! - **Atom & document encoding** ([`atom`]): the 128-bit packed record
//!   format and the predicate micro-operations evaluated directly against it.
//! - **Bin** ([`bin`]): append-only sharded store with lock-free concurrent
//!   insert and stable concurrent scan.
//! - **SlotRing** ([`slot_ring`]): a bounded multi-producer/single-consumer
//!   ring of fixed-capacity buffers connecting leaf scans to the composer.
//! - **LeafFilter** ([`leaf`]): a per-(predicate, bin) scan that emits
//!   matches into the slot ring.
//! - **Composer** ([`composer`]): drains the slot ring, builds per-bin
//!   intermediate state, and triggers per-bin finalization.
//! - **QueryDriver** ([`driver`]): orchestrates the worker pool and the
//!   composer; owns cancellation and metrics for one query.
//! - **Projection / Aggregation** ([`projection`], [`aggregate_output`]):
//!   format the final output into the caller-supplied buffer.
//!
//! Ambient concerns not part of the core pipeline's own call graph, but
//! needed for a complete, runnable crate: [`error`], [`logging`], [`config`],
//! [`registry`], [`persistence`], [`wire`], and the C-callable [`ffi`]
//! boundary.

pub mod aggregate_output;
pub mod atom;
pub mod bin;
pub mod chore;
pub mod collection;
pub mod composer;
pub mod config;
pub mod driver;
pub mod error;
pub mod ffi;
pub mod leaf;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod predicate_tree;
pub mod projection;
pub mod registry;
pub mod slot_ring;
pub mod wire;

pub use crate::aggregate_output::AggregateTarget;
pub use crate::atom::{AccOp, Atom, Operator, TypeTag};
pub use crate::chore::CancellationToken;
pub use crate::collection::Collection;
pub use crate::config::EngineConfig;
pub use crate::driver::{Projection, QueryDriver};
pub use crate::error::{EngineError, Result};
pub use crate::leaf::{AggregateLeaf, FindLeaf};
pub use crate::metrics::QueryMetrics;
pub use crate::predicate_tree::PredicateTree;
pub use crate::registry::CollectionRegistry;
