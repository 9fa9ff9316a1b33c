//! Formats matched elements from a "find" query into a single array-document
//! output buffer, honoring an optional field projection set.

use std::collections::HashSet;
use std::sync::Arc;

use crate::atom::{Atom, TypeTag, ID_NAME};
use crate::bin::Bin;
use crate::error::{EngineError, Result};

/// Appends one document delimiter atom after each projected element.
fn push_doc_delimiter(out: &mut Vec<Atom>) {
    out.push(Atom::new(0, 0, TypeTag::MaxKey, 8, 0));
}

fn project_all(atoms: &[Atom], out: &mut Vec<Atom>) {
    for atom in atoms {
        if atom.is_invalid() {
            break;
        }
        out.push(*atom);
    }
}

/// Projects a subset of fields from one element's atoms. `project_id`
/// follows the inverse convention: the caller's set *excluding* [`ID_NAME`]
/// means project it; including it means suppress it.
fn project_some(atoms: &[Atom], project_id: bool, names: &HashSet<u32>, do_all: bool, out: &mut Vec<Atom>) {
    let mut found_fields: HashSet<u32> = names.clone();
    let mut id_done = !project_id;
    let mut i = 0usize;

    while i < atoms.len() {
        let atom = atoms[i];
        if atom.is_invalid() {
            break;
        }
        let name = atom.name();
        let todo = if name == ID_NAME {
            id_done = true;
            project_id
        } else if !do_all {
            found_fields.remove(&name)
        } else {
            true
        };

        let mut parent_depth_to_skip: i32 = if atom.type_tag() == Some(TypeTag::ArrayDoc) {
            atom.value() as i32
        } else {
            0
        };

        if todo {
            out.push(atom);
            if atom.type_tag().map(TypeTag::has_inner_doc).unwrap_or(false) {
                let parent_doc_num = atom.docdepth();
                i += 1;
                while i < atoms.len() {
                    let inner = atoms[i];
                    if inner.is_invalid() {
                        break;
                    }
                    if inner.docdepth() == parent_doc_num {
                        parent_depth_to_skip -= 1;
                        if parent_depth_to_skip < 0 {
                            break;
                        }
                    }
                    out.push(inner);
                    i += 1;
                }
            }
            if !do_all && found_fields.is_empty() && id_done {
                break;
            }
        }
        i += 1;
    }
}

/// Builds the full output buffer for a "find" query: a header atom followed
/// by every matched element (in bin order), each terminated by a document
/// delimiter.
pub fn project(
    bins: &[Arc<Bin>],
    matches_per_bin: &[Vec<u32>],
    projection: Option<&HashSet<u32>>,
    max_output_bytes: usize,
) -> Result<Vec<Atom>> {
    let mut out = Vec::with_capacity(64);
    out.push(Atom::invalid()); // header placeholder, back-patched below
    let mut doc_count: u64 = 0;

    for (bin_idx, bin) in bins.iter().enumerate() {
        let Some(matched) = matches_per_bin.get(bin_idx) else {
            continue;
        };
        for &elem_idx in matched {
            let range = bin.get_elem_range(elem_idx).ok_or_else(|| {
                EngineError::Internal(format!(
                    "matched element {elem_idx} in bin {bin_idx} is no longer active"
                ))
            })?;
            doc_count += 1;

            match projection {
                None => project_all(range.as_slice(), &mut out),
                Some(names) if names.is_empty() => project_all(range.as_slice(), &mut out),
                Some(names) => {
                    let project_id = !names.contains(&ID_NAME);
                    let mut working = names.clone();
                    working.remove(&ID_NAME);
                    let do_all = working.is_empty();
                    project_some(range.as_slice(), project_id, &working, do_all, &mut out)
                }
            }
            push_doc_delimiter(&mut out);

            if out.len() * std::mem::size_of::<Atom>() > max_output_bytes {
                return Err(EngineError::OutputOverflow);
            }
        }
    }

    out[0] = Atom::new(-1, 0, TypeTag::ArrayDoc, 0, doc_count);
    Ok(out)
}
