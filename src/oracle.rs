//! The SMT oracle interface (C1) and a reference brute-force backend.
//!
//! SPEC_FULL treats the real decision procedure as an external
//! collaborator: the engine only ever submits a query and reads back
//! SAT/UNSAT plus an optional model. `BruteForceOracle` is this crate's
//! reference implementation of that boundary — correct, exponential in
//! the number of free variables, and meant only for this crate's own
//! tests and for small inputs. A production deployment implements
//! `Oracle` against a real bit-vector solver instead.

use std::collections::HashMap;

use crate::apint::ApInt;
use crate::error::{Result, SolverError};
use crate::ic::{InstRef, Kind, Payload};
use crate::pc::{collect_all_vars, Bpcs, Pcs};

/// A query submitted to the oracle: "is `predicate` satisfiable, given
/// that every `pcs`/`bpcs` equality holds?" `text` is the canonical
/// serialized form (SPEC_FULL's `BuildQuery` output); a real solver
/// backend parses `text` instead of walking `predicate` directly.
pub struct Query {
    pub text: String,
    pub bpcs: Bpcs,
    pub pcs: Pcs,
    pub predicate: InstRef,
}

/// The oracle's answer.
#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub sat: bool,
    pub model: Option<HashMap<String, ApInt>>,
}

/// The SMT oracle boundary (C1).
pub trait Oracle {
    /// Submit `query`; `timeout_ms` bounds the call. Any oracle error
    /// (including timeout) is surfaced as `SolverError::OracleFailure`.
    fn ask(&self, query: &Query, want_model: bool, timeout_ms: u64) -> Result<OracleResponse>;

    /// Whether this backend can return a model on SAT.
    fn supports_models(&self) -> bool;
}

fn eval(node: &InstRef, env: &HashMap<String, ApInt>) -> ApInt {
    match &node.payload {
        Payload::Var { name, .. } => env
            .get(name)
            .cloned()
            .unwrap_or_else(|| ApInt::zero(node.width)),
        Payload::Const(v) | Payload::UntypedConst(v) => v.clone(),
        Payload::Phi(_) => {
            // The reference oracle does not model control-flow edge
            // selection; it evaluates a Phi as its first incoming value.
            // None of this crate's scenarios rely on Phi semantics beyond
            // structural copying, so this is a documented simplification.
            eval(&node.operands[0], env)
        }
        Payload::ExtractValue(idx) => {
            let agg = &node.operands[0];
            match agg.kind {
                Kind::UAddWithOverflow => {
                    let a = eval(&agg.operands[0], env);
                    let b = eval(&agg.operands[1], env);
                    if *idx == 0 {
                        a.add(&b)
                    } else {
                        ApInt::from_u64(1, a.uadd_overflows(&b) as u64)
                    }
                }
                _ => eval(agg, env),
            }
        }
        Payload::None => {
            let ops: Vec<ApInt> = node.operands.iter().map(|o| eval(o, env)).collect();
            match node.kind {
                Kind::Add => ops[0].add(&ops[1]),
                Kind::Sub => ops[0].sub(&ops[1]),
                Kind::Mul => ops[0].mul(&ops[1]),
                Kind::UDiv => ops[0].udiv(&ops[1]),
                Kind::SDiv => ops[0].sdiv(&ops[1]),
                Kind::URem => ops[0].urem(&ops[1]),
                Kind::SRem => ops[0].srem(&ops[1]),
                Kind::And => ops[0].and(&ops[1]),
                Kind::Or => ops[0].or(&ops[1]),
                Kind::Xor => ops[0].xor(&ops[1]),
                Kind::Shl => ops[0].shl(ops[1].to_u64_truncating() as u32),
                Kind::LShr => ops[0].lshr(ops[1].to_u64_truncating() as u32),
                Kind::AShr => ops[0].ashr(ops[1].to_u64_truncating() as u32),
                Kind::Select => {
                    if !ops[0].is_zero() {
                        ops[1].clone()
                    } else {
                        ops[2].clone()
                    }
                }
                Kind::ZExt => ops[0].zext(node.width),
                Kind::SExt => ops[0].sext(node.width),
                Kind::Trunc => ops[0].trunc(node.width),
                Kind::Eq => ApInt::from_u64(1, (ops[0] == ops[1]) as u64),
                Kind::Ne => ApInt::from_u64(1, (ops[0] != ops[1]) as u64),
                Kind::Ult => ApInt::from_u64(
                    1,
                    (ops[0].cmp_unsigned(&ops[1]) == std::cmp::Ordering::Less) as u64,
                ),
                Kind::Ule => ApInt::from_u64(
                    1,
                    (ops[0].cmp_unsigned(&ops[1]) != std::cmp::Ordering::Greater) as u64,
                ),
                Kind::Slt => ApInt::from_u64(
                    1,
                    (ops[0].cmp_signed(&ops[1]) == std::cmp::Ordering::Less) as u64,
                ),
                Kind::Sle => ApInt::from_u64(
                    1,
                    (ops[0].cmp_signed(&ops[1]) != std::cmp::Ordering::Greater) as u64,
                ),
                Kind::UAddO => ApInt::from_u64(1, ops[0].uadd_overflows(&ops[1]) as u64),
                Kind::Var | Kind::Const | Kind::UntypedConst | Kind::Phi | Kind::ExtractValue | Kind::UAddWithOverflow => {
                    unreachable!("handled via Payload match above")
                }
            }
        }
    }
}

fn pcs_hold(bpcs: &Bpcs, pcs: &Pcs, env: &HashMap<String, ApInt>) -> bool {
    pcs.iter().all(|pc| eval(&pc.lhs, env) == eval(&pc.rhs, env))
        && bpcs
            .iter()
            .all(|bpc| eval(&bpc.condition.lhs, env) == eval(&bpc.condition.rhs, env))
}

/// Enumerate every assignment of `vars` up to `width` bits each, calling
/// `f` with an environment for each. Stops (returns `false` from the
/// caller's perspective via early return) as soon as `f` reports it found
/// what it was looking for.
fn for_each_assignment(
    vars: &[InstRef],
    idx: usize,
    env: &mut HashMap<String, ApInt>,
    f: &mut dyn FnMut(&HashMap<String, ApInt>) -> bool,
) -> bool {
    if idx == vars.len() {
        return f(env);
    }
    let var = &vars[idx];
    let name = match &var.payload {
        Payload::Var { name, .. } => name.clone(),
        _ => unreachable!(),
    };
    let width = var.width;
    let total: u64 = if width >= 64 { u64::MAX } else { 1u64 << width };
    let mut v = 0u64;
    loop {
        env.insert(name.clone(), ApInt::from_u64(width, v));
        if for_each_assignment(vars, idx + 1, env, f) {
            return true;
        }
        v += 1;
        if v >= total {
            break;
        }
    }
    env.remove(&name);
    false
}

/// A small, exact reference oracle: brute-forces every assignment of the
/// free variables reachable from the query. Exponential in variable count
/// x width, so only fit for the crate's own tests (widths up to ~12 bits,
/// a handful of variables).
#[derive(Default)]
pub struct BruteForceOracle {
    /// Safety valve: refuse to enumerate more than this many total
    /// variable-bits, so a misuse of this test oracle fails loudly
    /// instead of hanging.
    pub max_total_bits: u32,
}

impl BruteForceOracle {
    pub fn new() -> Self {
        BruteForceOracle { max_total_bits: 24 }
    }
}

impl Oracle for BruteForceOracle {
    fn ask(&self, query: &Query, want_model: bool, _timeout_ms: u64) -> Result<OracleResponse> {
        let vars = collect_all_vars(&query.bpcs, &query.pcs, &query.predicate);
        let total_bits: u32 = vars.iter().map(|v| v.width).sum();
        if total_bits > self.max_total_bits {
            return Err(SolverError::OracleFailure(format!(
                "BruteForceOracle refuses to enumerate {total_bits} bits of free variables"
            )));
        }
        let mut found_model: Option<HashMap<String, ApInt>> = None;
        let mut env = HashMap::new();
        let hit = for_each_assignment(&vars, 0, &mut env, &mut |env| {
            if !pcs_hold(&query.bpcs, &query.pcs, env) {
                return false;
            }
            let v = eval(&query.predicate, env);
            if !v.is_zero() {
                if want_model {
                    found_model = Some(env.clone());
                }
                true
            } else {
                false
            }
        });
        Ok(OracleResponse {
            sat: hit,
            model: if want_model { found_model } else { None },
        })
    }

    fn supports_models(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::print_rhs;
    use crate::ic::InstContext;

    fn query_for(bpcs: Bpcs, pcs: Pcs, predicate: InstRef) -> Query {
        let text = print_rhs(&predicate);
        Query { text, bpcs, pcs, predicate }
    }

    #[test]
    fn and_zero_is_always_zero() {
        let ic = InstContext::new();
        let x = ic.var("x", 4);
        let zero = ic.const_u64(4, 0);
        let lhs = ic.op(Kind::And, 4, vec![x, zero]);
        // universally prove lhs = 0 by checking NOT(lhs = 0) is UNSAT
        let eq = ic.op(Kind::Eq, 1, vec![lhs, ic.const_u64(4, 0)]);
        let not_eq = ic.op(Kind::Ne, 1, eq.operands.clone());
        let query = query_for(vec![], vec![], not_eq);
        let oracle = BruteForceOracle::new();
        let resp = oracle.ask(&query, false, 0).unwrap();
        assert!(!resp.sat, "And(x, 0) = 0 should hold for every x, so negation is UNSAT");
    }

    #[test]
    fn model_is_returned_on_sat() {
        let ic = InstContext::new();
        let x = ic.var("x", 4);
        let nine = ic.const_u64(4, 9);
        let pred = ic.op(Kind::Eq, 1, vec![x, nine]);
        let query = query_for(vec![], vec![], pred);
        let oracle = BruteForceOracle::new();
        let resp = oracle.ask(&query, true, 0).unwrap();
        assert!(resp.sat);
        let model = resp.model.unwrap();
        assert_eq!(model.get("x"), Some(&ApInt::from_u64(4, 9)));
    }

    #[test]
    fn too_many_bits_is_refused() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle { max_total_bits: 4 };
        let x = ic.var("x", 8);
        let pred = ic.op(Kind::Eq, 1, vec![x.clone(), x]);
        let query = query_for(vec![], vec![], pred);
        assert!(oracle.ask(&query, false, 0).is_err());
    }
}
