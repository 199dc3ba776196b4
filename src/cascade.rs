//! The inference cascade (C4): `infer` and `is_valid` (SPEC_FULL §4.4-4.5).
//! `infer` runs each strategy in strict order, short-circuiting at the
//! first success; a big-query/small-query disagreement in the no-op stage
//! is an invariant violation, not a recoverable error, and aborts the
//! process per §7.

use std::collections::HashMap;

use crate::apint::ApInt;
use crate::config::SolverOptions;
use crate::error::{Result, SolverError};
use crate::ic::{HarvestKind, InstContext, InstRef, Kind};
use crate::oracle::{Oracle, Query};
use crate::pc::{Bpcs, Mapping, Pcs};
use crate::rewriter;
use crate::synthesis::{Synthesizer, SynthesisOutcome};

fn eq_predicate(ic: &InstContext, lhs: &InstRef, rhs: &InstRef) -> InstRef {
    ic.op(Kind::Eq, 1, vec![lhs.clone(), rhs.clone()])
}

fn negate(ic: &InstContext, pred: &InstRef) -> InstRef {
    let one = ic.const_u64(1, 1);
    ic.op(Kind::Xor, 1, vec![pred.clone(), one])
}

fn build_query(ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, pred: &InstRef) -> Query {
    Query {
        text: crate::fingerprint::print_rhs(pred),
        bpcs: bpcs.clone(),
        pcs: pcs.clone(),
        predicate: pred.clone(),
    }
}

fn universally_holds(oracle: &dyn Oracle, ic: &InstContext, bpcs: &Bpcs, pcs: &Pcs, pred: &InstRef) -> Result<bool> {
    let negated = negate(ic, pred);
    let query = build_query(ic, bpcs, pcs, &negated);
    let start = std::time::Instant::now();
    let resp = oracle.ask(&query, false, 0);
    match &resp {
        Ok(r) => tracing::debug!(
            target: "peephole_solver::oracle",
            sat = r.sat,
            elapsed_us = start.elapsed().as_micros() as u64,
            "oracle call"
        ),
        Err(e) => tracing::warn!(
            target: "peephole_solver::oracle",
            error = %e,
            elapsed_us = start.elapsed().as_micros() as u64,
            "oracle call failed"
        ),
    }
    Ok(!resp?.sat)
}

/// Stage 1: cheap-constant guess. Tries `{0, 1}` and, for `W > 1`, `-1`.
fn cheap_constant_guess(ic: &InstContext, oracle: &dyn Oracle, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef, opts: &SolverOptions) -> Result<Option<InstRef>> {
    if !(opts.infer_ints || lhs.width == 1) {
        return Ok(None);
    }
    let mut candidates = vec![ic.const_u64(lhs.width, 0), ic.const_u64(lhs.width, 1)];
    if lhs.width > 1 {
        candidates.push(ic.constant(ApInt::all_ones(lhs.width)));
    }
    for c in candidates {
        let eq = eq_predicate(ic, lhs, &c);
        if universally_holds(oracle, ic, bpcs, pcs, &eq)? {
            return Ok(Some(c));
        }
    }
    Ok(None)
}

/// Stage 2: model-guided constant synthesis (SPEC_FULL §4.4.2, §4.3 synth
/// boundary). Bounded to `max_tries_infer` (default `1`) retries.
fn model_guided_constant_synthesis(ic: &InstContext, oracle: &dyn Oracle, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef, opts: &SolverOptions) -> Result<Option<InstRef>> {
    if !opts.infer_ints || !(oracle.supports_models() && lhs.width > 1) {
        return Ok(None);
    }
    let synth = crate::synthesis::ModelGuidedConstantSynthesizer;
    let width = lhs.width;
    let lhs2 = lhs.clone();
    let build_predicate = move |ic: &InstContext, candidate: &InstRef| -> InstRef {
        eq_predicate(ic, &lhs2, candidate)
    };
    let outcome = crate::synthesis::ConstantSynthesizer::synthesize(
        &synth, oracle, ic, bpcs, pcs, width, opts.max_tries_infer, &build_predicate,
    )?;
    match outcome {
        SynthesisOutcome::Found(c) => Ok(Some(c)),
        SynthesisOutcome::NotFound => Ok(None),
    }
}

/// Stage 4: no-op synthesis (SPEC_FULL §4.4.4). Enumerates width-matching
/// subterms, runs one "big query" that asks whether *any* candidate is
/// always equal to LHS, and if so runs individual "small queries" to find
/// which. A disagreement between the big and small queries is a protocol
/// or oracle bug, not a recoverable error — it aborts the process (`panic!`,
/// per §7's "Aborts the process" language for invariant violations).
fn no_op_synthesis(ic: &InstContext, oracle: &dyn Oracle, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef, opts: &SolverOptions) -> Result<Option<InstRef>> {
    if !opts.infer_nop {
        return Ok(None);
    }

    let mut subterms = Vec::new();
    collect_matching_width_subterms(lhs, lhs.width, &mut subterms);
    subterms.retain(|t| !std::rc::Rc::ptr_eq(t, lhs));
    subterms.truncate(opts.max_nops);
    if subterms.is_empty() {
        return Ok(None);
    }

    // Big query: compare each candidate against its own freshly-decorrelated
    // copy of LHS and of itself, then ask whether the disjunction of those
    // equalities holds universally. Per-candidate freshening matters: if no
    // single candidate is unconditionally equal to LHS, a counterexample
    // assignment exists for each one, and because the copies don't share
    // variables those counterexamples can all be realized at once, falsifying
    // every disjunct simultaneously. So the disjunction is universally true
    // iff at least one candidate really is a universal nop.
    let mut disjuncts = Vec::new();
    for (i, t) in subterms.iter().enumerate() {
        // Each disjunct gets its own suffix, so its copy of LHS/candidate
        // doesn't merely have a fresh *identity* but a fresh *name* — the
        // oracle resolves variables by name (see `oracle::eval`), so reusing
        // a name across disjuncts would silently re-correlate them.
        let suffix = format!("$nop{i}");
        let mut cache = rewriter::new_memo();
        let fresh_lhs = rewriter::copy_with_substitution(ic, lhs, &mut cache, Some(&suffix));
        let fresh_t = rewriter::copy_with_substitution(ic, t, &mut cache, Some(&suffix));
        disjuncts.push(eq_predicate(ic, &fresh_lhs, &fresh_t));
    }
    let any_equal = disjuncts.into_iter().reduce(|a, b| ic.op(Kind::Or, 1, vec![a, b])).unwrap();
    let big_found_one = universally_holds(oracle, ic, bpcs, pcs, &any_equal)?;

    let mut winner: Option<InstRef> = None;
    if !big_found_one && !opts.stress_nop {
        return Ok(None);
    }
    for t in &subterms {
        let eq = eq_predicate(ic, lhs, t);
        if universally_holds(oracle, ic, bpcs, pcs, &eq)? {
            winner = Some(t.clone());
            break;
        }
    }
    let small_found_one = winner.is_some();
    if big_found_one != small_found_one {
        let fp = crate::fingerprint::fingerprint(bpcs, pcs, lhs);
        tracing::error!(
            target: "peephole_solver::cascade",
            big = big_found_one,
            small = small_found_one,
            fingerprint = %fp,
            "no-op big/small query disagreement: aborting"
        );
        panic!(
            "no-op synthesis: big query and small queries disagree (big={big_found_one}, small={small_found_one}) — oracle or serialization bug. fingerprint: {fp}"
        );
    }

    Ok(winner)
}

fn collect_matching_width_subterms(root: &InstRef, width: u32, out: &mut Vec<InstRef>) {
    let mut seen = std::collections::HashSet::new();
    fn visit(n: &InstRef, width: u32, seen: &mut std::collections::HashSet<usize>, out: &mut Vec<InstRef>) {
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

/// `infer(BPCs, PCs, LHS) -> RHS?` (§4.4): the full six-stage cascade.
pub fn infer(
    ic: &InstContext,
    oracle: &dyn Oracle,
    bpcs: &Bpcs,
    pcs: &Pcs,
    lhs: &InstRef,
    opts: &SolverOptions,
    full_synth: &dyn Synthesizer,
) -> Result<Option<InstRef>> {
    tracing::debug!(target: "peephole_solver::cascade", stage = "cheap_constant_guess", "entering stage");
    if let Some(c) = cheap_constant_guess(ic, oracle, bpcs, pcs, lhs, opts)? {
        tracing::debug!(target: "peephole_solver::cascade", stage = "cheap_constant_guess", "stage succeeded");
        return Ok(Some(c));
    }

    tracing::debug!(target: "peephole_solver::cascade", stage = "model_guided_constant_synthesis", "entering stage");
    if let Some(c) = model_guided_constant_synthesis(ic, oracle, bpcs, pcs, lhs, opts)? {
        tracing::debug!(target: "peephole_solver::cascade", stage = "model_guided_constant_synthesis", "stage succeeded");
        return Ok(Some(c));
    }

    if lhs.harvest_kind == HarvestKind::HarvestedFromUse {
        tracing::debug!(target: "peephole_solver::cascade", stage = "harvest_exit", "short-circuiting on harvested-from-use LHS");
        return Ok(None);
    }

    tracing::debug!(target: "peephole_solver::cascade", stage = "no_op_synthesis", "entering stage");
    if let Some(winner) = no_op_synthesis(ic, oracle, bpcs, pcs, lhs, opts)? {
        tracing::debug!(target: "peephole_solver::cascade", stage = "no_op_synthesis", "stage succeeded");
        return Ok(Some(winner));
    }

    if oracle.supports_models() && (opts.exhaustive_synthesis || opts.infer_inst) {
        tracing::debug!(target: "peephole_solver::cascade", stage = "full_synthesis", "entering stage");
        let outcome = full_synth.synthesize(oracle, ic, bpcs, pcs, lhs)?;
        if outcome.rhs.is_some() {
            tracing::debug!(target: "peephole_solver::cascade", stage = "full_synthesis", "stage succeeded");
            return Ok(outcome.rhs);
        }
    }
    tracing::debug!(target: "peephole_solver::cascade", stage = "exhausted", "no stage produced a replacement");
    Ok(None)
}

/// `infer_const`: the constant-only prefix of the cascade (stages 1-2),
/// exposed separately per the uniform operation set in §4.8.
pub fn infer_const(
    ic: &InstContext,
    oracle: &dyn Oracle,
    bpcs: &Bpcs,
    pcs: &Pcs,
    lhs: &InstRef,
    opts: &SolverOptions,
) -> Result<Option<InstRef>> {
    if let Some(c) = cheap_constant_guess(ic, oracle, bpcs, pcs, lhs, opts)? {
        return Ok(Some(c));
    }
    model_guided_constant_synthesis(ic, oracle, bpcs, pcs, lhs, opts)
}

/// `is_valid` (§4.5): directly proves `mapping.lhs = mapping.rhs` by
/// negation. If `want_model` is set and the oracle supports models, a SAT
/// result (i.e. the mapping is invalid) is paired with the counterexample.
pub fn is_valid(
    ic: &InstContext,
    oracle: &dyn Oracle,
    mapping: &Mapping,
    bpcs: &Bpcs,
    pcs: &Pcs,
    want_model: bool,
) -> Result<(bool, Option<HashMap<String, ApInt>>)> {
    let eq = eq_predicate(ic, &mapping.lhs, &mapping.rhs);
    let negated = negate(ic, &eq);
    let query = build_query(ic, bpcs, pcs, &negated);
    let resp = oracle.ask(&query, want_model && oracle.supports_models(), 0)?;
    if resp.sat {
        Ok((false, resp.model))
    } else {
        Ok((true, None))
    }
}
