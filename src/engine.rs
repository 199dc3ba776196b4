//! The uniform engine contract (§4.8) and the base implementation that
//! composes the rewriter, prober, and cascade over an `Oracle`. Decorators
//! (`memo::MemoEngine`, `kv::KvEngine`) implement the same trait and forward
//! operations they don't cache straight through to an inner `SolverEngine`.

use crate::apint::ApInt;
use crate::cascade;
use crate::config::SolverOptions;
use crate::error::Result;
use crate::ic::{InstContext, InstRef};
use crate::oracle::Oracle;
use crate::pc::{Bpcs, Mapping, Pcs};
use crate::prober;
use crate::synthesis::{ExhaustiveSynthesizer, GuessAndCheckSynthesizer};

/// The capability set every decorator implements (§4.8): `infer`, `is_valid`,
/// `infer_const`, `constant_range`, `find_known_bits`, `known_bits`,
/// `negative`, `non_negative`, `power_of_two`, `non_zero`, `sign_bits`,
/// `demanded_bits`, `name`.
pub trait SolverEngine {
    fn infer(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>>;
    fn is_valid(&self, mapping: &Mapping, bpcs: &Bpcs, pcs: &Pcs, want_model: bool) -> Result<(bool, Option<std::collections::HashMap<String, ApInt>>)>;
    fn infer_const(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>>;
    fn constant_range(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, u64)>;
    fn find_known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)>;
    fn known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)>;
    fn negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool>;
    fn non_negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool>;
    fn power_of_two(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool>;
    fn non_zero(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool>;
    fn sign_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<u32>;
    fn demanded_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<std::collections::HashMap<String, ApInt>>;
    fn name(&self) -> &str;
}

/// The base engine: no caching, every operation goes straight to the oracle.
pub struct BaseEngine<'a> {
    pub ic: &'a InstContext,
    pub oracle: &'a dyn Oracle,
    pub options: SolverOptions,
}

impl<'a> BaseEngine<'a> {
    pub fn new(ic: &'a InstContext, oracle: &'a dyn Oracle, options: SolverOptions) -> Self {
        BaseEngine { ic, oracle, options }
    }

    fn const_synthesizer(&self) -> GuessAndCheckSynthesizer {
        GuessAndCheckSynthesizer
    }
}

impl<'a> SolverEngine for BaseEngine<'a> {
    fn infer(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>> {
        let synth = ExhaustiveSynthesizer;
        cascade::infer(self.ic, self.oracle, bpcs, pcs, lhs, &self.options, &synth)
    }

    fn is_valid(&self, mapping: &Mapping, bpcs: &Bpcs, pcs: &Pcs, want_model: bool) -> Result<(bool, Option<std::collections::HashMap<String, ApInt>>)> {
        cascade::is_valid(self.ic, self.oracle, mapping, bpcs, pcs, want_model)
    }

    fn infer_const(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<Option<InstRef>> {
        cascade::infer_const(self.ic, self.oracle, bpcs, pcs, lhs, &self.options)
    }

    fn constant_range(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, u64)> {
        let synth = self.const_synthesizer();
        prober::constant_range(
            self.oracle,
            self.ic,
            bpcs,
            pcs,
            lhs,
            self.options.max_tries_range,
            self.options.range_max_precise,
            &synth,
        )
    }

    fn find_known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)> {
        // SPEC_FULL's Open Question: `find_known_bits` and `known_bits`
        // behave identically. See DESIGN.md.
        self.known_bits(bpcs, pcs, lhs)
    }

    fn known_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<(ApInt, ApInt)> {
        prober::known_bits(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        prober::negative(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn non_negative(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        prober::non_negative(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn power_of_two(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        prober::power_of_two(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn non_zero(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<bool> {
        prober::non_zero(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn sign_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<u32> {
        prober::sign_bits(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn demanded_bits(&self, bpcs: &Bpcs, pcs: &Pcs, lhs: &InstRef) -> Result<std::collections::HashMap<String, ApInt>> {
        prober::demanded_bits(self.oracle, self.ic, bpcs, pcs, lhs)
    }

    fn name(&self) -> &str {
        "base"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ic::{InstContext, Kind};
    use crate::oracle::BruteForceOracle;

    #[test]
    fn base_engine_infers_zero_for_and_with_zero() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);
        let rhs = engine.infer(&vec![], &vec![], &lhs).unwrap();
        assert!(rhs.is_some());
        assert!(matches!(&rhs.unwrap().payload, crate::ic::Payload::Const(v) if v.is_zero()));
    }

    #[test]
    fn find_known_bits_matches_known_bits() {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let x = ic.var("x", 8);
        let lhs = ic.op(Kind::Or, 8, vec![x, ic.const_u64(8, 0x0F)]);
        let a = engine.known_bits(&vec![], &vec![], &lhs).unwrap();
        let b = engine.find_known_bits(&vec![], &vec![], &lhs).unwrap();
        assert_eq!(a, b);
    }
}
