//! The abstract-domain prober (C3): `known_bits`, `negative`/`non_negative`,
//! `power_of_two`, `non_zero`, `sign_bits`, `constant_range`, and
//! `demanded_bits` (SPEC_FULL §4.3). Every probe follows the same pattern —
//! build a predicate `P(LHS)`, ask whether `NOT P` is satisfiable, and treat
//! UNSAT as "`P` holds universally" — so results are sound
//! under-approximations: a bit claimed known really is known, but an
//! unclaimed bit may still happen to be determined.

use crate::apint::ApInt;
use crate::error::{Result, SolverError};
use crate::ic::{InstContext, InstRef, Kind};
use crate::oracle::{Oracle, Query};
use crate::pc::{collect_all_vars, Bpcs, Pcs};
use crate::rewriter;
use crate::synthesis::{ConstantSynthesizer, SynthesisOutcome};

fn ask_universal(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, pred: &InstRef) -> Result<bool> {
    debug_assert_eq!(pred.width, 1);
    let one = ic.const_u64(1, 1);
    let negated = ic.op(Kind::Xor, 1, vec![pred.clone(), one]);
    let query = Query {
        text: crate::fingerprint::print_rhs(&negated),
        bpcs: bpcs.clone(),
        pcs: pcs.clone(),
        predicate: negated,
    };
    let resp = oracle.ask(&query, false, 0)?;
    Ok(!resp.sat)
}

/// `known_bits(LHS) -> (Zero, One)`, LSB to MSB, per §4.3.1. `Zero & One`
/// is always empty; an unresolved bit is absent from both.
pub fn known_bits(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)> {
    let mut zero = ApInt::zero(lhs.width);
    let mut one = ApInt::zero(lhs.width);
    for i in 0..lhs.width {
        let candidate_zero = zero.with_bit_set(i);
        let masked = ic.op(Kind::And, lhs.width, vec![lhs.clone(), ic.constant(candidate_zero.or(&one))]);
        let eq = ic.op(Kind::Eq, 1, vec![masked, ic.constant(one.clone())]);
        if ask_universal(oracle, ic, bpcs, pcs, &eq)? {
            zero = zero.with_bit_set(i);
            continue;
        }
        let candidate_one = one.with_bit_set(i);
        let masked = ic.op(Kind::And, lhs.width, vec![lhs.clone(), ic.constant(zero.or(&candidate_one))]);
        let eq = ic.op(Kind::Eq, 1, vec![masked, ic.constant(candidate_one.clone())]);
        if ask_universal(oracle, ic, bpcs, pcs, &eq)? {
            one = one.with_bit_set(i);
        }
    }
    Ok((zero, one))
}

/// `negative(LHS)`: MSB forced to 1 under the preconditions.
pub fn negative(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
    let msb_mask = ic.constant(ApInt::zero(lhs.width).with_bit_set(lhs.width - 1));
    let masked = ic.op(Kind::And, lhs.width, vec![lhs.clone(), msb_mask.clone()]);
    let eq = ic.op(Kind::Eq, 1, vec![masked, msb_mask]);
    ask_universal(oracle, ic, bpcs, pcs, &eq)
}

/// `non_negative(LHS)`: MSB forced to 0 under the preconditions.
pub fn non_negative(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
    let msb_mask = ic.constant(ApInt::zero(lhs.width).with_bit_set(lhs.width - 1));
    let masked = ic.op(Kind::And, lhs.width, vec![lhs.clone(), msb_mask]);
    let eq = ic.op(Kind::Eq, 1, vec![masked, ic.const_u64(lhs.width, 0)]);
    ask_universal(oracle, ic, bpcs, pcs, &eq)
}

/// `power_of_two(LHS)`: universally prove `LHS != 0 AND (LHS - 1) & LHS = 0`.
pub fn power_of_two(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
    let zero = ic.const_u64(lhs.width, 0);
    let one = ic.const_u64(lhs.width, 1);
    let nonzero = ic.op(Kind::Ne, 1, vec![lhs.clone(), zero]);
    let minus_one = ic.op(Kind::Sub, lhs.width, vec![lhs.clone(), one]);
    let anded = ic.op(Kind::And, lhs.width, vec![minus_one, lhs.clone()]);
    let is_zero = ic.op(Kind::Eq, 1, vec![anded, ic.const_u64(lhs.width, 0)]);
    let conj = ic.op(Kind::And, 1, vec![nonzero, is_zero]);
    ask_universal(oracle, ic, bpcs, pcs, &conj)
}

/// `non_zero(LHS)`: universally prove `LHS != 0`.
pub fn non_zero(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
    let zero = ic.const_u64(lhs.width, 0);
    let pred = ic.op(Kind::Ne, 1, vec![lhs.clone(), zero]);
    ask_universal(oracle, ic, bpcs, pcs, &pred)
}

/// `sign_bits(LHS) -> k >= 1` per §4.3.5: the largest `k` for which
/// `LHS >>_arith (W-k)` is universally `0` or `-1`, starting from `k=2`
/// and stopping at the first failure; defaults to `1`.
pub fn sign_bits(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<u32> {
    let mut best = 1u32;
    for k in 2..=lhs.width {
        let shift_amount = lhs.width - k;
        let shifted = ic.op(Kind::AShr, lhs.width, vec![lhs.clone(), ic.const_u64(lhs.width, shift_amount as u64)]);
        let zero = ic.const_u64(lhs.width, 0);
        let all_ones = ic.constant(ApInt::all_ones(lhs.width));
        let is_zero = ic.op(Kind::Eq, 1, vec![shifted.clone(), zero]);
        let is_all_ones = ic.op(Kind::Eq, 1, vec![shifted, all_ones]);
        let pred = ic.op(Kind::Or, 1, vec![is_zero, is_all_ones]);
        if ask_universal(oracle, ic, bpcs, pcs, &pred)? {
            best = k;
        } else {
            break;
        }
    }
    Ok(best)
}

/// `test_range(c) -> Option<lo>` per §4.3.6: ask the constant-synthesis
/// boundary for a witness `lo` such that `LHS` is universally within the
/// circular interval `[lo, lo + c) mod 2^W`. Selects the wrap-around
/// (disjunctive) or non-wrap (conjunctive) form via the overflow bit of
/// `lo + c`.
fn test_range(
    oracle: &dyn Oracle,
    ic: &InstContext,
    bpcs: &Bpcs,
    pcs: &Pcs,
    lhs: &InstRef,
    c: u64,
    max_tries: u32,
    synthesizer: &dyn ConstantSynthesizer,
) -> Result<Option<ApInt>> {
    let width = lhs.width;
    let c_const = ic.const_u64(width, c);
    let lhs2 = lhs.clone();
    let build_predicate = move |ic: &InstContext, candidate: &InstRef| -> InstRef {
        let hi = ic.op(Kind::Add, width, vec![candidate.clone(), c_const.clone()]);
        let overflows = ic.op(Kind::UAddO, 1, vec![candidate.clone(), c_const.clone()]);
        let ge_lo = ic.op(Kind::Ule, 1, vec![candidate.clone(), lhs2.clone()]);
        let lt_hi = ic.op(Kind::Ult, 1, vec![lhs2.clone(), hi.clone()]);
        let non_wrap = ic.op(Kind::And, 1, vec![ge_lo.clone(), lt_hi.clone()]);
        let wraps_below_hi = ic.op(Kind::Ult, 1, vec![lhs2.clone(), hi]);
        let wraps_above_lo = ic.op(Kind::Ule, 1, vec![candidate.clone(), lhs2.clone()]);
        let wrap = ic.op(Kind::Or, 1, vec![wraps_above_lo, wraps_below_hi]);
        ic.op(Kind::Select, 1, vec![overflows, wrap, non_wrap])
    };
    let outcome = synthesizer.synthesize(oracle, ic, bpcs, pcs, width, max_tries, &build_predicate)?;
    match outcome {
        SynthesisOutcome::Found(c) => match &c.payload {
            crate::ic::Payload::Const(v) => Ok(Some(v.clone())),
            _ => Ok(None),
        },
        SynthesisOutcome::NotFound => Ok(None),
    }
}

/// `constant_range(LHS) -> [lo, lo + c)` per §4.3.6: binary search on the
/// interval width `c`, shrinking toward the smallest `c` for which
/// `test_range` finds a witness. `strict` mirrors `range-max-precise`: a
/// search step that can't get a definite answer raises `RangeImprecise`
/// instead of silently falling back to the full range.
pub fn constant_range(
    oracle: &dyn Oracle,
    ic: &InstContext,
    bpcs: &Bpcs,
    pcs: &Pcs,
    lhs: &InstRef,
    max_tries: u32,
    strict: bool,
    synthesizer: &dyn ConstantSynthesizer,
) -> Result<(ApInt, u64)> {
    let width = lhs.width;
    let full_c: u64 = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
    let mut lo_bound = 1u64;
    let mut hi_bound = full_c;
    let mut best: Option<(ApInt, u64)> = None;

    while lo_bound <= hi_bound {
        let mid = lo_bound + (hi_bound - lo_bound) / 2;
        match test_range(oracle, ic, bpcs, pcs, lhs, mid, max_tries, synthesizer)? {
            Some(witness) => {
                best = Some((witness, mid));
                if mid == 0 {
                    break;
                }
                hi_bound = mid - 1;
            }
            None => {
                if strict {
                    return Err(SolverError::RangeImprecise { tries: max_tries });
                }
                lo_bound = mid + 1;
            }
        }
    }

    Ok(best.unwrap_or((ApInt::zero(width), full_c.saturating_add(1))))
}

/// `demanded_bits(LHS) -> { var_name -> mask }` per §4.3.7: per reachable
/// variable, a bit is *not* demanded when flipping it (independently, via
/// `set_bit`/`clear_bit`) provably never changes `LHS`. The returned mask
/// has those bits cleared and every other bit set.
pub fn demanded_bits(
    oracle: &dyn Oracle,
    ic: &InstContext,
    bpcs: &Bpcs,
    pcs: &Pcs,
    lhs: &InstRef,
) -> Result<std::collections::HashMap<String, ApInt>> {
    use crate::ic::Payload;

    let working = match &lhs.payload {
        Payload::Var { demanded_bits, .. } if !demanded_bits.is_all_ones() => {
            ic.op(Kind::And, lhs.width, vec![lhs.clone(), ic.constant(demanded_bits.clone())])
        }
        _ => lhs.clone(),
    };

    let vars = collect_all_vars(bpcs, pcs, lhs);
    let mut result = std::collections::HashMap::new();
    for var in vars {
        let (name, width) = match &var.payload {
            Payload::Var { name, .. } => (name.clone(), var.width),
            _ => continue,
        };
        let mut mask = ApInt::zero(width);
        for b in 0..width {
            let mut memo_set = rewriter::new_memo();
            let mut memo_clear = rewriter::new_memo();
            let set_v = rewriter::set_bit(ic, &working, &name, b, &mut memo_set);
            let clr_v = rewriter::clear_bit(ic, &working, &name, b, &mut memo_clear);
            let eq_set = ic.op(Kind::Eq, 1, vec![working.clone(), set_v]);
            let eq_clr = ic.op(Kind::Eq, 1, vec![working.clone(), clr_v]);
            let set_holds = ask_universal(oracle, ic, bpcs, pcs, &eq_set)?;
            let clr_holds = ask_universal(oracle, ic, bpcs, pcs, &eq_clr)?;
            if !(set_holds && clr_holds) {
                mask = mask.with_bit_set(b);
            }
        }
        result.insert(name, mask);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::InstContext;
    use crate::oracle::BruteForceOracle;
    use crate::synthesis::GuessAndCheckSynthesizer;

    #[test]
    fn known_bits_of_or_with_constant() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::Or, 8, vec![x, ic.const_u64(8, 0x0F)]);
        let (zero, one) = known_bits(&oracle, &ic, &vec![], &vec![], &lhs).unwrap();
        assert_eq!(one, ApInt::from_u64(8, 0x0F));
        assert_eq!(zero, ApInt::zero(8));
    }

    #[test]
    fn demanded_bits_of_and_with_mask() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0xF0)]);
        let result = demanded_bits(&oracle, &ic, &vec![], &vec![], &lhs).unwrap();
        assert_eq!(result.get("x"), Some(&ApInt::from_u64(8, 0xF0)));
    }

    #[test]
    fn sign_bits_of_arithmetic_shift_by_width_minus_one() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::AShr, 8, vec![x, ic.const_u64(8, 7)]);
        let k = sign_bits(&oracle, &ic, &vec![], &vec![], &lhs).unwrap();
        assert_eq!(k, 8);
    }

    #[test]
    fn power_of_two_on_shl_one_under_fixed_shift_amount() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let y = ic.var("y", 8);
        let three = ic.const_u64(8, 3);
        let pcs = vec![crate::pc::PathCondition { lhs: y.clone(), rhs: three }];
        let one = ic.const_u64(8, 1);
        let lhs = ic.op(Kind::Shl, 8, vec![one, y]);
        assert!(power_of_two(&oracle, &ic, &vec![], &pcs, &lhs).unwrap());
    }

    #[test]
    fn non_zero_and_negative_agree_on_msb_only_value() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let msb = ic.const_u64(4, 0b1000);
        let lhs = ic.op(Kind::Or, 4, vec![x, msb]);
        assert!(non_zero(&oracle, &ic, &vec![], &vec![], &lhs).unwrap());
        assert!(negative(&oracle, &ic, &vec![], &vec![], &lhs).unwrap());
        assert!(!non_negative(&oracle, &ic, &vec![], &vec![], &lhs).unwrap());
    }

    #[test]
    fn constant_range_of_and_with_mask() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0x3F)]);
        let synth = GuessAndCheckSynthesizer;
        let (lo, c) = constant_range(&oracle, &ic, &vec![], &vec![], &lhs, 30, false, &synth).unwrap();
        assert_eq!(lo, ApInt::zero(8));
        assert_eq!(c, 0x40);
    }
}
