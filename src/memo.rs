//! The in-process memoization decorator (C5, SPEC_FULL §4.6). Wraps any
//! `SolverEngine` and fingerprint-keys two caches — `infer` and `is_valid`
//! — while forwarding every abstract-domain query straight through
//! uncached, per §4.6 ("Abstract-domain operations are not cached at this
//! layer").

use std::cell::RefCell;
use std::collections::HashMap;

use crate::apint::ApInt;
use crate::engine::SolverEngine;
use crate::error::{Result, SolverError};
use crate::fingerprint::{self, parse_replacement_rhs};
use crate::ic::InstContext;
use crate::ic::InstRef;
use crate::pc::{collect_all_vars, Bpcs, Mapping, Pcs};
use crate::stats::Stats;

type CachedInfer = std::result::Result<Option<String>, SolverError>;
type CachedIsValid = std::result::Result<bool, SolverError>;

/// Wraps an inner `SolverEngine`, memoizing `infer` and `is_valid` by the
/// fingerprint of their inputs.
pub struct MemoEngine<'a, E> {
    ic: &'a InstContext,
    inner: E,
    infer_cache: RefCell<HashMap<String, CachedInfer>>,
    isvalid_cache: RefCell<HashMap<String, CachedIsValid>>,
    stats: Stats,
}

impl<'a, E: SolverEngine> MemoEngine<'a, E> {
    pub fn new(ic: &'a InstContext, inner: E) -> Self {
        MemoEngine {
            ic,
            inner,
            infer_cache: RefCell::new(HashMap::new()),
            isvalid_cache: RefCell::new(HashMap::new()),
            stats: Stats::new(),
        }
    }

    /// The six monotonic counters (SPEC_FULL §6), as observed by this
    /// decorator and everything it wraps.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn vars_for(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> HashMap<String, InstRef> {
        let mut map = HashMap::new();
        for v in collect_all_vars(bpcs, pcs, lhs) {
            if let crate::ic::Payload::Var { name, .. } = &v.payload {
                map.insert(name.clone(), v.clone());
            }
        }
        map
    }
}

impl<'a, E: SolverEngine> SolverEngine for MemoEngine<'a, E> {
    fn infer(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>> {
        let fp = fingerprint::fingerprint(bpcs, pcs, lhs);
        if let Some(cached) = self.infer_cache.borrow().get(&fp).cloned() {
            self.stats.record_mem_hit_infer();
            tracing::debug!(target: "peephole_solver::memo", fingerprint = %fp, "infer cache hit");
            return match cached {
                Ok(None) => Ok(None),
                Ok(Some(text)) => {
                    let vars = self.vars_for(bpcs, pcs, lhs);
                    let node = parse_replacement_rhs(self.ic, &text, &vars)?;
                    Ok(Some(node))
                }
                Err(e) => Err(e),
            };
        }

        self.stats.record_mem_miss_infer();
        tracing::debug!(target: "peephole_solver::memo", fingerprint = %fp, "infer cache miss");
        let result = self.inner.infer(bpcs, pcs, lhs);
        let to_store: CachedInfer = match &result {
            Ok(None) => Ok(None),
            Ok(Some(rhs)) => Ok(Some(fingerprint::print_rhs(rhs))),
            Err(e) => Err(e.clone()),
        };
        self.infer_cache.borrow_mut().insert(fp, to_store);
        result
    }

    fn is_valid(
        &self,
        mapping: &Mapping,
        bpcs: &Bpcs,
        pcs: &Pcs,
        want_model: bool,
    ) -> Result<(bool, Option<HashMap<String, ApInt>>)> {
        // A model sink bypasses the cache: the cache only ever stores a
        // bool, never a counter-model (SPEC_FULL §4.6).
        if want_model {
            return self.inner.is_valid(mapping, bpcs, pcs, want_model);
        }

        let fp = fingerprint::mapping_fingerprint(mapping);
        if let Some(cached) = self.isvalid_cache.borrow().get(&fp).cloned() {
            self.stats.record_mem_hit_is_valid();
            tracing::debug!(target: "peephole_solver::memo", fingerprint = %fp, "is_valid cache hit");
            return match cached {
                Ok(valid) => Ok((valid, None)),
                Err(e) => Err(e),
            };
        }

        self.stats.record_mem_miss_is_valid();
        tracing::debug!(target: "peephole_solver::memo", fingerprint = %fp, "is_valid cache miss");
        let result = self.inner.is_valid(mapping, bpcs, pcs, false);
        let to_store: CachedIsValid = match &result {
            Ok((valid, _)) => Ok(*valid),
            Err(e) => Err(e.clone()),
        };
        self.isvalid_cache.borrow_mut().insert(fp, to_store);
        result
    }

    fn infer_const(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>> {
        self.inner.infer_const(bpcs, pcs, lhs)
    }

    fn constant_range(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, u64)> {
        self.inner.constant_range(bpcs, pcs, lhs)
    }

    fn find_known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)> {
        self.inner.find_known_bits(bpcs, pcs, lhs)
    }

    fn known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)> {
        self.inner.known_bits(bpcs, pcs, lhs)
    }

    fn negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        self.inner.negative(bpcs, pcs, lhs)
    }

    fn non_negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        self.inner.non_negative(bpcs, pcs, lhs)
    }

    fn power_of_two(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        self.inner.power_of_two(bpcs, pcs, lhs)
    }

    fn non_zero(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        self.inner.non_zero(bpcs, pcs, lhs)
    }

    fn sign_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<u32> {
        self.inner.sign_bits(bpcs, pcs, lhs)
    }

    fn demanded_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<HashMap<String, ApInt>> {
        self.inner.demanded_bits(bpcs, pcs, lhs)
    }

    fn name(&self) -> &str {
        "memo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverOptions;
    use crate::engine::BaseEngine;
    use crate::ic::{InstContext, Kind};
    use crate::oracle::BruteForceOracle;

    #[test]
    fn infer_hits_second_time_with_identical_result() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let memo = MemoEngine::new(&ic, base);

        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);

        let first = memo.infer(&vec![], &vec![], &lhs).unwrap();
        let second = memo.infer(&vec![], &vec![], &lhs).unwrap();
        assert_eq!(
            first.map(|r| fingerprint::print_rhs(&r)),
            second.map(|r| fingerprint::print_rhs(&r))
        );

        let snap = memo.stats().snapshot();
        assert_eq!(snap.mem_misses_infer, 1);
        assert_eq!(snap.mem_hits_infer, 1);
    }

    #[test]
    fn is_valid_with_model_bypasses_cache() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let memo = MemoEngine::new(&ic, base);

        let x = ic.var("x", 4);
        let one = ic.const_u64(4, 1);
        let mapping = Mapping::new(x.clone(), ic.op(Kind::Add, 4, vec![x, one]));

        let (valid, model) = memo.is_valid(&mapping, &vec![], &vec![], true).unwrap();
        assert!(!valid);
        assert!(model.is_some());
        // bypassing the cache means no hit/miss counter moved
        assert_eq!(memo.stats().snapshot().mem_misses_is_valid, 0);
    }

    #[test]
    fn abstract_domain_queries_are_not_cached_but_still_correct() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let memo = MemoEngine::new(&ic, base);

        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::Or, 8, vec![x, ic.const_u64(8, 0x0F)]);
        let (zero, one) = memo.known_bits(&vec![], &vec![], &lhs).unwrap();
        assert_eq!(one, ApInt::from_u64(8, 0x0F));
        assert_eq!(zero, ApInt::zero(8));
    }
}
