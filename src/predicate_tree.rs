//! Postfix AND/OR evaluation of the "find" quantifier against a boolean
//! vector, one entry per predicate.

use crate::error::{EngineError, Result};

pub const OP_OR: u32 = 9;
pub const OP_AND: u32 = 10;
pub const OP_START: u32 = 9999;
pub const OP_END: u32 = 9998;
pub const OP_AND_ALL: u32 = 9997;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeNode {
    pub op: TreeOp,
    pub arity: u32,
}

/// A postfix sequence of AND/OR nodes, or one of the two special-cased
/// shapes (empty tree, `AND_ALL`).
pub enum PredicateTree {
    /// A single predicate with no combinator; the boolean vector must have
    /// exactly one entry.
    Trivial,
    /// Conjunction over every entry in the boolean vector.
    AndAll,
    /// General postfix AND/OR sequence.
    Nodes(Vec<TreeNode>),
}

impl PredicateTree {
    /// Builds a tree from a raw `(command, kids)` sequence as carried on the
    /// wire, bracketed by `Start`/`End` sentinels which this strips.
    pub fn from_wire(commands: &[(u32, u32)]) -> Result<Self> {
        let body = strip_sentinels(commands)?;

        if body.is_empty() {
            return Ok(Self::Trivial);
        }
        if body.len() == 1 && body[0].0 == OP_AND_ALL {
            return Ok(Self::AndAll);
        }

        let mut nodes = Vec::with_capacity(body.len());
        for &(command, arity) in body {
            let op = match command {
                OP_AND => TreeOp::And,
                OP_OR => TreeOp::Or,
                other => {
                    return Err(EngineError::MalformedQuery(format!(
                        "unsupported predicate-tree command {other}"
                    )))
                }
            };
            nodes.push(TreeNode { op, arity });
        }
        Ok(Self::Nodes(nodes))
    }

    /// Evaluates the tree against `matches`, one boolean per predicate index.
    pub fn evaluate(&self, matches: &[bool]) -> Result<bool> {
        match self {
            Self::Trivial => {
                if matches.len() != 1 {
                    return Err(EngineError::MalformedQuery(
                        "trivial predicate tree requires exactly one predicate".into(),
                    ));
                }
                Ok(matches[0])
            }
            Self::AndAll => Ok(matches.iter().all(|m| *m)),
            Self::Nodes(nodes) => {
                let mut stack: Vec<bool> = matches.to_vec();
                for node in nodes {
                    let arity = node.arity as usize;
                    if stack.len() < arity || arity == 0 {
                        return Err(EngineError::MalformedQuery(
                            "predicate tree node arity exceeds available operands".into(),
                        ));
                    }
                    let start = stack.len() - arity;
                    let operands: Vec<bool> = stack.drain(start..).collect();
                    let result = match node.op {
                        TreeOp::And => operands.iter().all(|m| *m),
                        TreeOp::Or => operands.iter().any(|m| *m),
                    };
                    stack.push(result);
                }
                if stack.len() != 1 {
                    return Err(EngineError::MalformedQuery(
                        "predicate tree did not reduce to a single result".into(),
                    ));
                }
                Ok(stack[0])
            }
        }
    }
}

fn strip_sentinels(commands: &[(u32, u32)]) -> Result<&[(u32, u32)]> {
    match commands {
        [] => Ok(commands),
        [(first, _), .., (last, _)] if *first == OP_START && *last == OP_END => {
            Ok(&commands[1..commands.len() - 1])
        }
        [(first, _), ..] if *first == OP_START => Err(EngineError::MalformedQuery(
            "predicate tree missing End sentinel".into(),
        )),
        _ => Ok(commands),
    }
}
