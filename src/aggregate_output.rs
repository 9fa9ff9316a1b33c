//! Folds per-leaf [`AggMatch`] records into group rows and formats them into
//! the same array-document output convention as [`crate::projection`].

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::atom::{AccOp, Atom, TypeTag, ID_NAME};
use crate::error::{EngineError, Result};
use crate::leaf::AggMatch;

/// One `Aggr1` record resolved into an accumulator target: which leaf feeds
/// it, what field name the folded scalar is emitted under, and how values
/// are combined.
#[derive(Debug, Clone, Copy)]
pub struct AggregateTarget {
    pub leaf_index: u32,
    pub target_name: u32,
    pub op: AccOp,
}

struct GroupRow {
    group: Atom,
    values: Vec<f64>,
}

/// Groups tie on the filter-equality convention: depth is stripped so two
/// group atoms at different nesting depths but the same name/value collapse
/// into one row.
fn group_key(atom: Atom) -> (u64, u64) {
    let stripped = atom.remove_doc();
    (stripped.low, stripped.high)
}

/// Folds every target's matches into per-group accumulator rows. A group
/// absent from one target's matches keeps that target's identity value.
fn fold(targets: &[AggregateTarget], matches_by_leaf: &HashMap<u32, Vec<AggMatch>>) -> Vec<GroupRow> {
    let mut rows: HashMap<(u64, u64), GroupRow> = HashMap::new();

    for (target_idx, target) in targets.iter().enumerate() {
        let Some(matches) = matches_by_leaf.get(&target.leaf_index) else {
            continue;
        };
        for m in matches {
            let key = group_key(m.group);
            let row = rows.entry(key).or_insert_with(|| GroupRow {
                group: m.group,
                values: targets.iter().map(|t| t.op.identity()).collect(),
            });
            row.values[target_idx] = target.op.merge(row.values[target_idx], m.contribution);
        }
    }

    rows.into_values().collect()
}

fn push_doc_delimiter(out: &mut Vec<Atom>) {
    out.push(Atom::new(0, 0, TypeTag::MaxKey, 8, 0));
}

/// Folds and formats an aggregate query's result buffer. `sort_ascending`
/// orders rows by the first target's folded value; ties and a missing first
/// target are left in arbitrary (hash-map) order.
pub fn aggregate(
    targets: &[AggregateTarget],
    matches_by_leaf: &HashMap<u32, Vec<AggMatch>>,
    sort_ascending: bool,
    max_output_bytes: usize,
) -> Result<Vec<Atom>> {
    let mut rows = fold(targets, matches_by_leaf);
    if sort_ascending {
        rows.sort_by(|a, b| {
            let av = a.values.first().copied().unwrap_or(0.0);
            let bv = b.values.first().copied().unwrap_or(0.0);
            av.partial_cmp(&bv).unwrap_or(Ordering::Equal)
        });
    }

    let mut out = Vec::with_capacity(64);
    out.push(Atom::invalid());
    let mut doc_count: u64 = 0;

    for row in &rows {
        doc_count += 1;
        let group_type = row.group.type_tag().unwrap_or(TypeTag::Int64);
        out.push(Atom::new(row.group.docdepth(), ID_NAME, group_type, row.group.vlen(), row.group.value()));
        for (target, value) in targets.iter().zip(row.values.iter()) {
            out.push(Atom::from_f64(0, target.target_name, *value));
        }
        push_doc_delimiter(&mut out);

        if out.len() * std::mem::size_of::<Atom>() > max_output_bytes {
            return Err(EngineError::OutputOverflow);
        }
    }

    out[0] = Atom::new(-1, 0, TypeTag::ArrayDoc, 0, doc_count);
    Ok(out)
}
