//! The DAG rewriter (C2): purely functional copy/substitute over the
//! interned DAG, memoized per call so every source node maps to exactly
//! one output node (SPEC_FULL §4.2).

use std::collections::HashMap;
use std::rc::Rc;

use crate::ic::{InstContext, InstRef, Kind, Payload};

type Memo = HashMap<usize, InstRef>;

fn memo_key(n: &InstRef) -> usize {
    Rc::as_ptr(n) as usize
}

/// Structural copy: constants and untyped constants pass through
/// unchanged; phis are rebuilt with the same block; every other node is
/// rebuilt from freshly-copied operands. `fresh_suffix`, if given, renames
/// every `Var` to a decorrelated clone carrying a new, unique name (the
/// original name with `fresh_suffix` appended) — used by the no-op
/// strategy (§4.4 stage 4) to decorrelate subterms being compared in one
/// "big query". A name collision between two "independent" copies would
/// make the oracle (which keys variable assignments by name, per
/// SPEC_FULL's `APInt`-per-variable model) treat them as the same
/// variable, silently defeating the decorrelation, so the suffix must be
/// unique per call — callers pass a different suffix per disjunct.
pub fn copy_with_substitution(
    ic: &InstContext,
    n: &InstRef,
    cache: &mut Memo,
    fresh_suffix: Option<&str>,
) -> InstRef {
    if let Some(existing) = cache.get(&memo_key(n)) {
        return existing.clone();
    }
    let result = match &n.payload {
        Payload::Const(_) | Payload::UntypedConst(_) => n.clone(),
        Payload::Var { name, demanded_bits } => {
            if let Some(suffix) = fresh_suffix {
                // A structurally distinct node carrying a distinct name:
                // not interned into the shared table, and not equal under
                // name-keyed variable resolution to any other occurrence
                // of `name` either.
                Rc::new(crate::ic::Inst {
                    kind: Kind::Var,
                    width: n.width,
                    operands: vec![],
                    payload: Payload::Var {
                        name: format!("{name}{suffix}"),
                        demanded_bits: demanded_bits.clone(),
                    },
                    harvest_kind: crate::ic::HarvestKind::Normal,
                })
            } else {
                n.clone()
            }
        }
        Payload::Phi(block) => {
            let operands: Vec<InstRef> = n
                .operands
                .iter()
                .map(|op| copy_with_substitution(ic, op, cache, fresh_suffix))
                .collect();
            ic.phi(n.width, block.clone(), operands)
        }
        Payload::ExtractValue(idx) => {
            let agg = copy_with_substitution(ic, &n.operands[0], cache, fresh_suffix);
            ic.extract_value(n.width, agg, *idx)
        }
        Payload::None => {
            let operands: Vec<InstRef> = n
                .operands
                .iter()
                .map(|op| copy_with_substitution(ic, op, cache, fresh_suffix))
                .collect();
            ic.op(n.kind, n.width, operands)
        }
    };
    cache.insert(memo_key(n), result.clone());
    result
}

/// Replace every occurrence of variable `var_name` with `var OR (1 <<
/// bit_pos)`; every other node is copied structurally. Used by
/// `demanded_bits` (§4.3.7).
pub fn set_bit(ic: &InstContext, n: &InstRef, var_name: &str, bit_pos: u32, cache: &mut Memo) -> InstRef {
    rewrite_bit(ic, n, var_name, bit_pos, cache, true)
}

/// Replace every occurrence of variable `var_name` with `var AND ~(1 <<
/// bit_pos)`; every other node is copied structurally.
pub fn clear_bit(ic: &InstContext, n: &InstRef, var_name: &str, bit_pos: u32, cache: &mut Memo) -> InstRef {
    rewrite_bit(ic, n, var_name, bit_pos, cache, false)
}

fn rewrite_bit(
    ic: &InstContext,
    n: &InstRef,
    var_name: &str,
    bit_pos: u32,
    cache: &mut Memo,
    set: bool,
) -> InstRef {
    if let Some(existing) = cache.get(&memo_key(n)) {
        return existing.clone();
    }
    let result = match &n.payload {
        Payload::Const(_) | Payload::UntypedConst(_) => n.clone(),
        Payload::Var { name, .. } if name == var_name => {
            let mask = ic.const_u64(n.width, 1u64 << bit_pos);
            if set {
                ic.op(Kind::Or, n.width, vec![n.clone(), mask])
            } else {
                let not_mask = crate::apint::ApInt::from_u64(n.width, 1u64 << bit_pos).not();
                let not_mask = ic.constant(not_mask);
                ic.op(Kind::And, n.width, vec![n.clone(), not_mask])
            }
        }
        Payload::Var { .. } => n.clone(),
        Payload::Phi(block) => {
            let operands: Vec<InstRef> = n
                .operands
                .iter()
                .map(|op| rewrite_bit(ic, op, var_name, bit_pos, cache, set))
                .collect();
            ic.phi(n.width, block.clone(), operands)
        }
        Payload::ExtractValue(idx) => {
            let agg = rewrite_bit(ic, &n.operands[0], var_name, bit_pos, cache, set);
            ic.extract_value(n.width, agg, *idx)
        }
        Payload::None => {
            let operands: Vec<InstRef> = n
                .operands
                .iter()
                .map(|op| rewrite_bit(ic, op, var_name, bit_pos, cache, set))
                .collect();
            ic.op(n.kind, n.width, operands)
        }
    };
    cache.insert(memo_key(n), result.clone());
    result
}

/// A fresh, empty memo table for one rewriter call.
pub fn new_memo() -> Memo {
    HashMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::InstContext;

    #[test]
    fn copy_with_substitution_preserves_width_and_shape() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let zero = ic.const_u64(8, 0);
        let expr = ic.op(Kind::And, 8, vec![x, zero]);
        let mut memo = new_memo();
        let copy = copy_with_substitution(&ic, &expr, &mut memo, None);
        assert_eq!(copy.width, expr.width);
        assert!(Rc::ptr_eq(&copy, &expr), "without a fresh_suffix the copy is identical (hash-consed)");
    }

    #[test]
    fn copy_with_fresh_vars_decorrelates() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let expr = ic.op(Kind::Add, 8, vec![x.clone(), x.clone()]);
        let mut memo = new_memo();
        let copy = copy_with_substitution(&ic, &expr, &mut memo, Some("$1"));
        assert!(!Rc::ptr_eq(&copy, &expr));
        assert_eq!(copy.operands.len(), 2);
        // the two operand copies of `x` inside `copy` are the SAME fresh var
        // (memoized per source node), even though they differ from the
        // original `x`.
        assert!(Rc::ptr_eq(&copy.operands[0], &copy.operands[1]));
        match &copy.operands[0].payload {
            Payload::Var { name, .. } => assert_eq!(name, "x$1"),
            _ => panic!("expected a Var payload"),
        }
    }

    #[test]
    fn copy_with_distinct_suffixes_gives_distinct_names() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let mut memo_a = new_memo();
        let mut memo_b = new_memo();
        let a = copy_with_substitution(&ic, &x, &mut memo_a, Some("$0"));
        let b = copy_with_substitution(&ic, &x, &mut memo_b, Some("$1"));
        assert!(!Rc::ptr_eq(&a, &b));
        let name_of = |n: &InstRef| match &n.payload {
            Payload::Var { name, .. } => name.clone(),
            _ => panic!("expected a Var payload"),
        };
        assert_ne!(name_of(&a), name_of(&b));
    }

    #[test]
    fn set_bit_replaces_named_variable_only() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let y = ic.var("y", 8);
        let expr = ic.op(Kind::Add, 8, vec![x, y.clone()]);
        let mut memo = new_memo();
        let rewritten = set_bit(&ic, &expr, "x", 2, &mut memo);
        assert_eq!(rewritten.kind, Kind::Add);
        assert_eq!(rewritten.operands[0].kind, Kind::Or);
        assert!(Rc::ptr_eq(&rewritten.operands[1], &y));
    }

    #[test]
    fn clear_bit_replaces_named_variable_only() {
        let ic = InstContext::new();
        let x = ic.var("x", 8);
        let mut memo = new_memo();
        let rewritten = clear_bit(&ic, &x, "x", 0, &mut memo);
        assert_eq!(rewritten.kind, Kind::And);
    }
}
