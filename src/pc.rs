//! Path conditions, block-path conditions, and the LHS/RHS `Mapping` being
//! verified. These are read-only inputs to every operation in the engine.

use crate::ic::{BlockRef, InstRef};

/// A single assumed equality `lhs = rhs`, read as a conjunct.
#[derive(Debug, Clone)]
pub struct PathCondition {
    pub lhs: InstRef,
    pub rhs: InstRef,
}

/// An ordered sequence of path conditions, interpreted as their conjunction.
pub type Pcs = Vec<PathCondition>;

/// A path condition gated on a specific predecessor block.
#[derive(Debug, Clone)]
pub struct BlockPathCondition {
    pub block: BlockRef,
    pub predecessor: usize,
    pub condition: PathCondition,
}

pub type Bpcs = Vec<BlockPathCondition>;

/// A candidate rewrite `lhs -> rhs` being verified or synthesized, both of
/// equal width.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub lhs: InstRef,
    pub rhs: InstRef,
}

impl Mapping {
    pub fn new(lhs: InstRef, rhs: InstRef) -> Self {
        assert_eq!(lhs.width, rhs.width, "mapping sides must have equal width");
        Mapping { lhs, rhs }
    }
}

/// Collect every `Var` node reachable from `root`, deduplicated by name.
/// Used by `demanded_bits` (SPEC_FULL §4.3.7) to enumerate the variable set
/// reachable from the LHS and from every PC side.
pub fn collect_vars(root: &InstRef, out: &mut Vec<InstRef>) {
    use crate::ic::Kind;
    fn visit(node: &InstRef, seen: &mut std::collections::HashSet<usize>, out: &mut Vec<InstRef>) {
        let ptr = std::rc::Rc::as_ptr(node) as usize;
        if !seen.insert(ptr) {
            return;
        }
        if node.kind == Kind::Var {
            out.push(node.clone());
        }
        for op in &node.operands {
            visit(op, seen, out);
        }
    }
    let mut seen = std::collections::HashSet::new();
    visit(root, &mut seen, out);
}

/// Every variable reachable from the LHS or from any side of any PC/BPC.
pub fn collect_all_vars(bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Vec<InstRef> {
    let mut out = Vec::new();
    let mut seen_names = std::collections::HashSet::new();
    let mut push_unique = |v: InstRef, out: &mut Vec<InstRef>| {
        let name = match &v.payload {
            crate::ic::Payload::Var { name, .. } => name.clone(),
            _ => return,
        };
        if seen_names.insert(name) {
            out.push(v);
        }
    };
    let mut buf = Vec::new();
    collect_vars(lhs, &mut buf);
    for v in buf.drain(..) {
        push_unique(v, &mut out);
    }
    for pc in pcs {
        let mut buf = Vec::new();
        collect_vars(&pc.lhs, &mut buf);
        collect_vars(&pc.rhs, &mut buf);
        for v in buf.drain(..) {
            push_unique(v, &mut out);
        }
    }
    for bpc in bpcs {
        let mut buf = Vec::new();
        collect_vars(&bpc.condition.lhs, &mut buf);
        collect_vars(&bpc.condition.rhs, &mut buf);
        for v in buf.drain(..) {
            push_unique(v, &mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::{InstContext, Kind};

    #[test]
    fn collect_vars_dedupes() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let expr = ic.op(Kind::Add, 8, vec![x.clone(), x.clone()]);
        let mut out = Vec::new();
        collect_vars(&expr, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn collect_all_vars_includes_pc_sides() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let y = ic.var("y", 8);
        let zero = ic.const_u64(8, 0);
        let pcs = vec![PathCondition { lhs: y.clone(), rhs: zero.clone() }];
        let vars = collect_all_vars(&vec![], &pcs, &x);
        assert_eq!(vars.len(), 2);
    }
}
