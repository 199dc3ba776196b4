//! The persistent external key-value boundary (SPEC_FULL §4.7, §6). The
//! distilled spec treats the KV store as an external collaborator reachable
//! only through `hGet`/`hSet` under a fingerprint key and the field name
//! `"result"`; this module defines that trait and ships one in-process
//! reference implementation so the crate's own tests (and single-process
//! deployments) don't need a network dependency.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::apint::ApInt;
use crate::config::SolverOptions;
use crate::engine::SolverEngine;
use crate::error::{Result, SolverError};
use crate::fingerprint::{self, parse_replacement_rhs};
use crate::ic::{InstContext, InstRef};
use crate::pc::{collect_all_vars, Bpcs, Mapping, Pcs};
use crate::stats::Stats;

/// The external KV boundary: `hGet`/`hSet` on a fingerprint key, field
/// `"result"`. A real deployment plugs a networked store in behind this
/// trait; nothing else in this crate depends on the storage medium.
pub trait KvStore {
    /// Read `field` under `key`. `None` means the key (or field) is absent,
    /// which is distinct from a present-but-empty value — SPEC_FULL §4.7
    /// uses a present empty value to mean "solved, no RHS".
    fn h_get(&self, key: &str, field: &str) -> Option<String>;

    /// Write `value` under `key`/`field`. Last-writer-wins, matching the
    /// "externally synchronized, functions of the key" model in SPEC_FULL
    /// §5.
    fn h_set(&self, key: &str, field: &str, value: &str);
}

/// A single-process, in-memory `KvStore`. Useful for tests and for
/// deployments that don't need the cache to outlive the process.
#[derive(Default)]
pub struct InMemoryKvStore {
    table: RefCell<HashMap<(String, String), String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for InMemoryKvStore {
    fn h_get(&self, key: &str, field: &str) -> Option<String> {
        self.table
            .borrow()
            .get(&(key.to_string(), field.to_string()))
            .cloned()
    }

    fn h_set(&self, key: &str, field: &str, value: &str) {
        self.table
            .borrow_mut()
            .insert((key.to_string(), field.to_string()), value.to_string());
    }
}

/// The persistent-cache decorator (C6, SPEC_FULL §4.7). Same shape as
/// `MemoEngine` but backed by a `KvStore` and caching only `infer` — every
/// other operation, including `is_valid`, forwards straight to the inner
/// engine.
pub struct KvEngine<'a, E> {
    ic: &'a InstContext,
    inner: E,
    store: &'a dyn KvStore,
    options: SolverOptions,
    stats: Stats,
}

impl<'a, E: SolverEngine> KvEngine<'a, E> {
    pub fn new(ic: &'a InstContext, inner: E, store: &'a dyn KvStore, options: SolverOptions) -> Self {
        KvEngine {
            ic,
            inner,
            store,
            options,
            stats: Stats::new(),
        }
    }

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

impl<'a, E: SolverEngine> SolverEngine for KvEngine<'a, E> {
    fn infer(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>> {
        let fp = fingerprint::fingerprint(bpcs, pcs, lhs);
        if fp.len() > self.options.max_lhs_size {
            // LHS fingerprints exceeding MaxLHSSize bypass the cache
            // entirely (SPEC_FULL §4.7) rather than admitting an oversized
            // entry.
            return Err(SolverError::ValueTooLarge);
        }

        match self.store.h_get(&fp, "result") {
            Some(value) => {
                self.stats.record_external_hit();
                tracing::debug!(target: "peephole_solver::kv", fingerprint = %fp, "external cache hit");
                if value.is_empty() {
                    Ok(None)
                } else {
                    let vars = self.vars_for(bpcs, pcs, lhs);
                    let node = parse_replacement_rhs(self.ic, &value, &vars)?;
                    Ok(Some(node))
                }
            }
            None => {
                self.stats.record_external_miss();
                tracing::debug!(target: "peephole_solver::kv", fingerprint = %fp, "external cache miss");
                if self.options.no_infer {
                    // Populate the cache with "queries we would ask" without
                    // consulting the underlying engine, so operators can
                    // solve them later offline (SPEC_FULL §4.7).
                    self.store.h_set(&fp, "result", "");
                    return Ok(None);
                }
                let result = self.inner.infer(bpcs, pcs, lhs);
                if let Ok(rhs) = &result {
                    let text = rhs.as_ref().map(|r| fingerprint::print_rhs(r)).unwrap_or_default();
                    self.store.h_set(&fp, "result", &text);
                }
                result
            }
        }
    }

    fn is_valid(
        &self,
        mapping: &Mapping,
        bpcs: &Bpcs,
        pcs: &Pcs,
        want_model: bool,
    ) -> Result<(bool, Option<HashMap<String, ApInt>>)> {
        self.inner.is_valid(mapping, bpcs, pcs, want_model)
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
        "kv"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_is_none() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.h_get("fp1", "result"), None);
    }

    #[test]
    fn present_empty_value_is_distinct_from_absent() {
        let kv = InMemoryKvStore::new();
        kv.h_set("fp1", "result", "");
        assert_eq!(kv.h_get("fp1", "result"), Some(String::new()));
        assert_eq!(kv.h_get("fp2", "result"), None);
    }

    #[test]
    fn last_writer_wins() {
        let kv = InMemoryKvStore::new();
        kv.h_set("fp1", "result", "(Add x:i8 y:i8)");
        kv.h_set("fp1", "result", "x:i8");
        assert_eq!(kv.h_get("fp1", "result"), Some("x:i8".to_string()));
    }

    use crate::engine::BaseEngine;
    use crate::ic::{InstContext, Kind};
    use crate::oracle::BruteForceOracle;

    #[test]
    fn infer_populates_the_store_and_hits_second_time() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let store = InMemoryKvStore::new();
        let kv_engine = KvEngine::new(&ic, base, &store, SolverOptions::default());

        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);

        let first = kv_engine.infer(&vec![], &vec![], &lhs).unwrap();
        assert!(first.is_some());
        assert_eq!(kv_engine.stats().snapshot().external_misses, 1);

        let second = kv_engine.infer(&vec![], &vec![], &lhs).unwrap();
        assert!(second.is_some());
        assert_eq!(kv_engine.stats().snapshot().external_hits, 1);
    }

    #[test]
    fn no_infer_records_empty_result_without_calling_base() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let store = InMemoryKvStore::new();
        let mut opts = SolverOptions::default();
        opts.no_infer = true;
        let kv_engine = KvEngine::new(&ic, base, &store, opts);

        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);
        let fp = fingerprint::fingerprint(&vec![], &vec![], &lhs);

        let result = kv_engine.infer(&vec![], &vec![], &lhs).unwrap();
        assert!(result.is_none());
        assert_eq!(store.h_get(&fp, "result"), Some(String::new()));
    }

    #[test]
    fn oversized_lhs_bypasses_the_cache() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let base = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let store = InMemoryKvStore::new();
        let mut opts = SolverOptions::default();
        opts.max_lhs_size = 1;
        let kv_engine = KvEngine::new(&ic, base, &store, opts);

        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);
        let err = kv_engine.infer(&vec![], &vec![], &lhs).unwrap_err();
        assert!(matches!(err, SolverError::ValueTooLarge));
    }
}
