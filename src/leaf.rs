//! Per-(predicate, bin) scans that emit match records into the shared
//! [`SlotRing`].
//!
//! A `FindLeaf` walks a bin looking for elements with at least one atom
//! satisfying a comparison predicate. An `AggregateLeaf` walks a bin looking
//! for elements carrying both a named group atom and a named value atom,
//! folding the latter into an accumulator keyed by the former.

use crate::atom::{AccOp, Atom, Operator};
use crate::bin::Bin;
use crate::slot_ring::SlotRing;

/// `(leaf_index, bin_index)` — the payload carried by every promoted slot.
pub type LeafPayload = (u32, u32);

/// One element index matched by a find leaf.
pub type FindMatch = u32;

/// A `(group atom, value contribution)` pair matched by an aggregate leaf.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggMatch {
    pub group: Atom,
    pub contribution: f64,
}

/// A comparison predicate scanned over one bin.
pub struct FindLeaf {
    leaf_index: u32,
    operator: Operator,
    filter: Atom,
}

impl FindLeaf {
    /// `filter` should already have depth cleared via [`Atom::remove_doc`] so
    /// depth plays no role in the match.
    pub fn new(leaf_index: u32, operator: Operator, filter: Atom) -> Self {
        Self {
            leaf_index,
            operator,
            filter: filter.remove_doc(),
        }
    }

    pub fn leaf_index(&self) -> u32 {
        self.leaf_index
    }

    /// Scans every active element of `bin`, emitting matching element indexes
    /// into slots drawn from `ring`.
    pub fn apply(&self, bin: &Bin, ring: &SlotRing<FindMatch, LeafPayload>) -> crate::error::Result<()> {
        let payload: LeafPayload = (self.leaf_index, bin.index());
        let mut handle = ring.reserve_slot()?;

        for (elem_idx, range) in bin.scan() {
            let matched = range
                .iter()
                .any(|atom| crate::atom::evaluate(self.operator, self.filter, atom.remove_doc()));

            if matched {
                if !ring.try_push(&handle, elem_idx) {
                    ring.promote(handle, payload);
                    handle = ring.reserve_slot()?;
                    // the retried push is guaranteed to fit a freshly reserved slot
                    ring.try_push(&handle, elem_idx);
                }
            }
        }

        // Always promote, even with zero matches, so the reserved slot
        // returns to the pool rather than staying held forever.
        ring.promote(handle, payload);
        Ok(())
    }
}

/// A group-by accumulator scanned over one bin.
pub struct AggregateLeaf {
    leaf_index: u32,
    group_name: u32,
    value_name: u32,
    op: AccOp,
}

impl AggregateLeaf {
    pub fn new(leaf_index: u32, group_name: u32, value_name: u32, op: AccOp) -> Self {
        Self {
            leaf_index,
            group_name,
            value_name,
            op,
        }
    }

    pub fn leaf_index(&self) -> u32 {
        self.leaf_index
    }

    pub fn apply(&self, bin: &Bin, ring: &SlotRing<AggMatch, LeafPayload>) -> crate::error::Result<()> {
        let payload: LeafPayload = (self.leaf_index, bin.index());
        let mut handle = ring.reserve_slot()?;

        for (_elem_idx, range) in bin.scan() {
            let mut group: Option<Atom> = None;
            let mut value: Option<Atom> = None;

            for atom in range.iter() {
                if atom.is_invalid() {
                    break;
                }
                if group.is_none() && atom.name() == self.group_name {
                    group = Some(*atom);
                } else if value.is_none() && atom.name() == self.value_name {
                    value = Some(*atom);
                }
                if group.is_some() && value.is_some() {
                    break;
                }
            }

            if let (Some(group), Some(value)) = (group, value) {
                let contribution = if self.op == AccOp::Count {
                    1.0
                } else if value.type_tag() == Some(crate::atom::TypeTag::Floatnum) {
                    value.as_f64()
                } else {
                    value.value() as i64 as f64
                };
                let entry = AggMatch { group, contribution };

                if !ring.try_push(&handle, entry) {
                    ring.promote(handle, payload);
                    handle = ring.reserve_slot()?;
                    ring.try_push(&handle, entry);
                }
            }
        }

        ring.promote(handle, payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::TypeTag;

    fn bin_with_elements(values: &[u64]) -> Bin {
        let bin = Bin::new(0, 1024, 64);
        for &v in values {
            let atoms = [
                Atom::new(0, 10, TypeTag::Int64, 8, v),
                Atom::new(0, 20, TypeTag::Int64, 8, v * 2),
            ];
            let idx = bin.acquire_buffer(atoms.len() as u32).unwrap();
            bin.write_elem(idx, &atoms);
            bin.release_buffer(idx).unwrap();
        }
        bin
    }

    #[test]
    fn find_leaf_matches_and_promotes() {
        let bin = bin_with_elements(&[1, 2, 3]);
        let ring: SlotRing<FindMatch, LeafPayload> = SlotRing::new(4, 8, 100);
        let filter = Atom::new(0, 10, TypeTag::Int64, 8, 2);
        let leaf = FindLeaf::new(7, Operator::Eq, filter);
        leaf.apply(&bin, &ring).unwrap();

        let (_, payload, items) = ring.consume_one().unwrap();
        assert_eq!(payload, (7, 0));
        assert_eq!(items, vec![1]);
    }

    #[test]
    fn aggregate_leaf_sums_matching_values() {
        let bin = bin_with_elements(&[1, 2, 3]);
        let ring: SlotRing<AggMatch, LeafPayload> = SlotRing::new(4, 8, 100);
        let leaf = AggregateLeaf::new(0, 10, 20, AccOp::Sum);
        leaf.apply(&bin, &ring).unwrap();

        let (_, _, items) = ring.consume_one().unwrap();
        let total: f64 = items.iter().map(|e| e.contribution).sum();
        assert_eq!(total, 2.0 + 4.0 + 6.0);
    }

    #[test]
    fn aggregate_leaf_count_ignores_value_magnitude() {
        let bin = bin_with_elements(&[10, 20, 30]);
        let ring: SlotRing<AggMatch, LeafPayload> = SlotRing::new(4, 8, 100);
        let leaf = AggregateLeaf::new(0, 10, 20, AccOp::Count);
        leaf.apply(&bin, &ring).unwrap();

        let (_, _, items) = ring.consume_one().unwrap();
        assert!(items.iter().all(|e| e.contribution == 1.0));
    }
}
