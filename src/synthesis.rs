//! Constant synthesis and full-instruction synthesis — the two families of
//! "ask an external synthesizer for a witness" subprocedures SPEC_FULL
//! treats as external collaborators (§4.3.6, §4.4 stage 2, §4.4 stage 5).
//!
//! Each is a trait so a real deployment can swap in an actual synthesis
//! engine; this crate ships one reference implementation per trait,
//! bounded and correct, sufficient for the crate's own tests.

use crate::error::Result;
use crate::ic::{InstContext, InstRef, Kind};
use crate::oracle::{Oracle, Query};
use crate::pc::{Bpcs, Pcs};

/// Outcome of a bounded constant-synthesis attempt.
pub enum SynthesisOutcome {
    Found(InstRef),
    NotFound,
}

/// `NOT p`, as a width-1 node (`Xor(p, 1)`).
fn negate_predicate(ic: &InstContext, pred: &InstRef) -> InstRef {
    debug_assert_eq!(pred.width, 1);
    let one = ic.const_u64(1, 1);
    ic.op(Kind::Xor, 1, vec![pred.clone(), one])
}

fn universally_holds(
    oracle: &dyn Oracle,
    bpcs: &Bpcs,
    pcs: &Pcs,
    ic: &InstContext,
    pred: &InstRef,
) -> Result<bool> {
    let negated = negate_predicate(ic, pred);
    let query = Query {
        text: crate::fingerprint::print_rhs(&negated),
        bpcs: bpcs.clone(),
        pcs: pcs.clone(),
        predicate: negated,
    };
    let resp = oracle.ask(&query, false, 0)?;
    Ok(!resp.sat)
}

/// The constant-synthesis boundary: given a hole-predicate builder (which
/// turns a concrete candidate constant node into the width-1 predicate
/// that must hold universally), find a witness constant.
pub trait ConstantSynthesizer {
    fn synthesize(
        &self,
        oracle: &dyn Oracle,
        ic: &InstContext,
        bpcs: &Bpcs,
        pcs: &Pcs,
        width: u32,
        max_tries: u32,
        build_predicate: &dyn Fn(&InstContext, &InstRef) -> InstRef,
    ) -> Result<SynthesisOutcome>;
}

/// Reference implementation: tries a small set of likely candidates first
/// (`0`, `1`, `-1`), then sweeps the remaining values in order, stopping
/// after `max_tries` distinct candidates. Every "success" is independently
/// re-checked by the oracle (`universally_holds`), so this is sound
/// regardless of search order — only completeness is bounded.
pub struct GuessAndCheckSynthesizer;

impl ConstantSynthesizer for GuessAndCheckSynthesizer {
    fn synthesize(
        &self,
        oracle: &dyn Oracle,
        ic: &InstContext,
        bpcs: &Bpcs,
        pcs: &Pcs,
        width: u32,
        max_tries: u32,
        build_predicate: &dyn Fn(&InstContext, &InstRef) -> InstRef,
    ) -> Result<SynthesisOutcome> {
        let mut tried = std::collections::HashSet::new();
        let mut candidates: Vec<u64> = vec![0, 1];
        if width > 1 {
            candidates.push(if width >= 64 { u64::MAX } else { (1u64 << width) - 1 });
        }
        let max_value: u64 = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
        let mut next = 2u64;
        while candidates.len() < max_tries as usize && next <= max_value {
            candidates.push(next);
            next += 1;
        }

        for raw in candidates.into_iter().take(max_tries as usize) {
            if !tried.insert(raw) {
                continue;
            }
            let candidate = ic.const_u64(width, raw);
            let pred = build_predicate(ic, &candidate);
            if universally_holds(oracle, bpcs, pcs, ic, &pred)? {
                return Ok(SynthesisOutcome::Found(candidate));
            }
        }
        Ok(SynthesisOutcome::NotFound)
    }
}

/// Outcome of a full-instruction synthesis attempt (§4.4 stage 5): either
/// a replacement RHS, or an error code, mirroring the `(RHS?, error_code)`
/// contract in the distilled spec.
pub struct FullSynthesisOutcome {
    pub rhs: Option<InstRef>,
}

/// The full-instruction-synthesis boundary (§4.4 stage 5).
pub trait Synthesizer {
    fn synthesize(
        &self,
        oracle: &dyn Oracle,
        ic: &InstContext,
        bpcs: &Bpcs,
        pcs: &Pcs,
        lhs: &InstRef,
    ) -> Result<FullSynthesisOutcome>;
}

/// Reference exhaustive synthesizer: tries a small fixed library of
/// single-instruction rewrites over LHS's own width-matching subterms
/// (bitwise complement, negation, shift by a constant harvested from the
/// LHS itself). This is deliberately tiny — real component-based or
/// exhaustive synthesis is out of this crate's budget, per SPEC_FULL §4.4.
pub struct ExhaustiveSynthesizer;

fn subterms_of_matching_width(root: &InstRef, width: u32, out: &mut Vec<InstRef>) {
    let mut seen = std::collections::HashSet::new();
    fn visit(
        n: &InstRef,
        width: u32,
        seen: &mut std::collections::HashSet<usize>,
        out: &mut Vec<InstRef>,
    ) {
        let ptr = std::rc::Rc::as_ptr(n) as usize;
        if !seen.insert(ptr) {
            return;
        }
        if n.width == width {
            out.push(n.clone());
        }
        for op in &n.operands {
            visit(op, width, seen, out);
        }
    }
    visit(root, width, &mut seen, out);
}

fn harvested_shift_amount(root: &InstRef) -> Option<u64> {
    use crate::ic::Payload;
    let mut found = None;
    let mut seen = std::collections::HashSet::new();
    fn visit(
        n: &InstRef,
        found: &mut Option<u64>,
        seen: &mut std::collections::HashSet<usize>,
    ) {
        if found.is_some() {
            return;
        }
        let ptr = std::rc::Rc::as_ptr(n) as usize;
        if !seen.insert(ptr) {
            return;
        }
        if let Payload::Const(v) = &n.payload {
            if !v.is_zero() {
                *found = Some(v.to_u64_truncating());
                return;
            }
        }
        for op in &n.operands {
            visit(op, found, seen);
        }
    }
    visit(root, &mut found, &mut seen);
    found
}

impl Synthesizer for ExhaustiveSynthesizer {
    fn synthesize(
        &self,
        oracle: &dyn Oracle,
        ic: &InstContext,
        bpcs: &Bpcs,
        pcs: &Pcs,
        lhs: &InstRef,
    ) -> Result<FullSynthesisOutcome> {
        let mut subterms = Vec::new();
        subterms_of_matching_width(lhs, lhs.width, &mut subterms);

        let mut candidates: Vec<InstRef> = Vec::new();
        for t in &subterms {
            candidates.push(ic.op(Kind::Xor, lhs.width, vec![t.clone(), ic.const_u64(lhs.width, {
                if lhs.width >= 64 { u64::MAX } else { (1u64 << lhs.width) - 1 }
            })]));
            candidates.push(ic.op(Kind::Sub, lhs.width, vec![ic.const_u64(lhs.width, 0), t.clone()]));
            if let Some(amount) = harvested_shift_amount(lhs) {
                if amount < lhs.width as u64 {
                    candidates.push(ic.op(Kind::Shl, lhs.width, vec![t.clone(), ic.const_u64(lhs.width, amount)]));
                    candidates.push(ic.op(Kind::LShr, lhs.width, vec![t.clone(), ic.const_u64(lhs.width, amount)]));
                }
            }
        }

        for candidate in candidates {
            if std::rc::Rc::ptr_eq(&candidate, lhs) {
                continue;
            }
            let eq = ic.op(Kind::Eq, 1, vec![lhs.clone(), candidate.clone()]);
            if universally_holds(oracle, bpcs, pcs, ic, &eq)? {
                return Ok(FullSynthesisOutcome { rhs: Some(candidate) });
            }
        }
        Ok(FullSynthesisOutcome { rhs: None })
    }
}

/// Reference model-guided implementation (SPEC_FULL §4.4 stage 2): rather
/// than sweeping a fixed guess list, introduce a fresh hole variable `C`,
/// ask the oracle for *any* satisfying assignment of `build_predicate(C)`
/// with a model, and read `C`'s value back out of that model as the
/// guess. A guess is only ever returned once it is independently
/// re-checked to hold universally (`universally_holds`), so — like
/// `GuessAndCheckSynthesizer` — soundness never depends on the oracle's
/// search strategy, only completeness is bounded by `max_tries`.
pub struct ModelGuidedConstantSynthesizer;

impl ConstantSynthesizer for ModelGuidedConstantSynthesizer {
    fn synthesize(
        &self,
        oracle: &dyn Oracle,
        ic: &InstContext,
        bpcs: &Bpcs,
        pcs: &Pcs,
        width: u32,
        max_tries: u32,
        build_predicate: &dyn Fn(&InstContext, &InstRef) -> InstRef,
    ) -> Result<SynthesisOutcome> {
        if !oracle.supports_models() {
            return Ok(SynthesisOutcome::NotFound);
        }
        let mut tried = std::collections::HashSet::new();
        for attempt in 0..max_tries {
            let hole_name = format!("$synth_const{attempt}");
            let hole = ic.var(hole_name.clone(), width);
            let pred = build_predicate(ic, &hole);
            let query = Query {
                text: crate::fingerprint::print_rhs(&pred),
                bpcs: bpcs.clone(),
                pcs: pcs.clone(),
                predicate: pred,
            };
            let resp = oracle.ask(&query, true, 0)?;
            if !resp.sat {
                // No assignment at all satisfies the predicate for any `C`:
                // no constant can possibly work.
                return Ok(SynthesisOutcome::NotFound);
            }
            let Some(model) = resp.model else {
                return Ok(SynthesisOutcome::NotFound);
            };
            let Some(value) = model.get(&hole_name) else {
                return Ok(SynthesisOutcome::NotFound);
            };
            if !tried.insert(value.clone()) {
                continue;
            }
            let candidate = ic.constant(value.clone());
            let verify_pred = build_predicate(ic, &candidate);
            if universally_holds(oracle, bpcs, pcs, ic, &verify_pred)? {
                return Ok(SynthesisOutcome::Found(candidate));
            }
        }
        Ok(SynthesisOutcome::NotFound)
    }
}

/// Component-based synthesis is the seam for a real synthesis engine that
/// composes a small instruction library under an oracle-checked sketch;
/// building one is out of this crate's scope (SPEC_FULL §1). This stub
/// always reports "not found", matching the `(RHS?, error_code)` contract
/// with both components absent.
pub struct ComponentSynthesizer;

impl Synthesizer for ComponentSynthesizer {
    fn synthesize(
        &self,
        _oracle: &dyn Oracle,
        _ic: &InstContext,
        _bpcs: &Bpcs,
        _pcs: &Pcs,
        _lhs: &InstRef,
    ) -> Result<FullSynthesisOutcome> {
        Ok(FullSynthesisOutcome { rhs: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::InstContext;
    use crate::oracle::BruteForceOracle;

    #[test]
    fn guess_and_check_finds_zero() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let lhs = ic.op(Kind::And, 4, vec![x, ic.const_u64(4, 0)]);
        let synth = GuessAndCheckSynthesizer;
        let outcome = synth
            .synthesize(&oracle, &ic, &vec![], &vec![], 4, 30, &|ic, c| {
                ic.op(Kind::Eq, 1, vec![lhs.clone(), c.clone()])
            })
            .unwrap();
        match outcome {
            SynthesisOutcome::Found(c) => match &c.payload {
                crate::ic::Payload::Const(v) => assert!(v.is_zero()),
                _ => panic!("expected a Const payload"),
            },
            SynthesisOutcome::NotFound => panic!("expected to find 0"),
        }
    }

    #[test]
    fn model_guided_finds_constant_forced_by_a_path_condition() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let nine = ic.const_u64(4, 9);
        let pcs = vec![crate::pc::PathCondition { lhs: x.clone(), rhs: nine }];
        let synth = ModelGuidedConstantSynthesizer;
        let outcome = synth
            .synthesize(&oracle, &ic, &vec![], &pcs, 4, 1, &|ic, c| {
                ic.op(Kind::Eq, 1, vec![x.clone(), c.clone()])
            })
            .unwrap();
        match outcome {
            SynthesisOutcome::Found(c) => match &c.payload {
                crate::ic::Payload::Const(v) => assert_eq!(*v, crate::apint::ApInt::from_u64(4, 9)),
                _ => panic!("expected a Const payload"),
            },
            SynthesisOutcome::NotFound => panic!("expected to find 9 from the path condition"),
        }
    }

    #[test]
    fn model_guided_reports_not_found_when_no_constant_works() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let synth = ModelGuidedConstantSynthesizer;
        let outcome = synth
            .synthesize(&oracle, &ic, &vec![], &vec![], 4, 1, &|ic, c| {
                ic.op(Kind::Eq, 1, vec![x.clone(), c.clone()])
            })
            .unwrap();
        assert!(matches!(outcome, SynthesisOutcome::NotFound));
    }

    #[test]
    fn exhaustive_synthesizer_finds_not() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let all_ones = ic.const_u64(4, 0xF);
        let lhs = ic.op(Kind::Xor, 4, vec![x.clone(), all_ones]);
        // lhs is already exactly Not(x); exhaustive search should recognize
        // some equivalent subterm-based rewrite exists (possibly lhs itself
        // filtered out, but Sub(0,x) won't equal Not(x) in general so this
        // mainly exercises that the search terminates and returns a sound
        // answer when one exists).
        let synth = ExhaustiveSynthesizer;
        let outcome = synth.synthesize(&oracle, &ic, &vec![], &vec![], &lhs).unwrap();
        if let Some(rhs) = outcome.rhs {
            // whatever it found must be oracle-confirmed equal to lhs
            let eq = ic.op(Kind::Eq, 1, vec![lhs.clone(), rhs]);
            assert!(universally_holds(&oracle, &vec![], &vec![], &ic, &eq).unwrap());
        }
    }

    #[test]
    fn component_synthesizer_always_reports_not_found() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let x = ic.var("x", 4);
        let synth = ComponentSynthesizer;
        let outcome = synth.synthesize(&oracle, &ic, &vec![], &vec![], &x).unwrap();
        assert!(outcome.rhs.is_none());
    }
}
