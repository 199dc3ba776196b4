//! Configuration knobs (SPEC_FULL §6). Not environment/CLI driven — driver
//! glue is out of scope — just a plain struct a host process fills in.

use serde::{Deserialize, Serialize};

/// Tunable behavior for the inference cascade and the caching decorators.
/// Field names match the CLI-surface names in SPEC_FULL §6 for stability,
/// spelled as idiomatic Rust identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// `no-infer`: persistent-cache misses record an empty result without
    /// calling the underlying engine.
    pub no_infer: bool,
    /// `infer-nop`: enable the no-op strategy (cascade stage 4).
    pub infer_nop: bool,
    /// `stress-nop`: always run the small-query loop even when the big
    /// query is SAT.
    pub stress_nop: bool,
    /// `max-nops`: cap on no-op candidates considered.
    pub max_nops: usize,
    /// `infer-iN`: enable the cheap-constant strategies (stages 1-2) for
    /// `width > 1`.
    pub infer_ints: bool,
    /// `infer-inst`: enable component-based synthesis (cascade stage 5).
    pub infer_inst: bool,
    /// `exhaustive-synthesis`: enable exhaustive-search synthesis in stage 5.
    pub exhaustive_synthesis: bool,
    /// `max-lhs-size`: bytes; external-cache admission limit.
    pub max_lhs_size: usize,
    /// `range-max-precise`: strict errors on constant-synthesis exhaustion
    /// inside `constant_range`.
    pub range_max_precise: bool,
    /// `MaxTries` for `infer`'s model-guided constant synthesis (§5).
    pub max_tries_infer: u32,
    /// `MaxTries` for `constant_range`'s binary search (§5).
    pub max_tries_range: u32,
    /// Per-oracle-call timeout in milliseconds (§5).
    pub timeout_ms: u64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            no_infer: false,
            infer_nop: false,
            stress_nop: false,
            max_nops: 20,
            infer_ints: true,
            infer_inst: false,
            exhaustive_synthesis: false,
            max_lhs_size: 1024,
            range_max_precise: false,
            max_tries_infer: 1,
            max_tries_range: 30,
            timeout_ms: 10_000,
        }
    }
}

impl SolverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Conservative preset: only the cheapest, least surprising strategies.
    /// No-op and instruction synthesis both off; strict range inference.
    pub fn conservative() -> Self {
        SolverOptions {
            infer_nop: false,
            infer_inst: false,
            exhaustive_synthesis: false,
            range_max_precise: true,
            ..SolverOptions::default()
        }
    }

    /// Aggressive preset: every strategy enabled, at the cost of more
    /// oracle calls per `infer`.
    pub fn aggressive() -> Self {
        SolverOptions {
            infer_nop: true,
            stress_nop: true,
            infer_inst: true,
            exhaustive_synthesis: true,
            ..SolverOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_defaults() {
        let o = SolverOptions::default();
        assert!(!o.no_infer);
        assert!(!o.infer_nop);
        assert_eq!(o.max_nops, 20);
        assert!(o.infer_ints);
        assert!(!o.infer_inst);
        assert_eq!(o.max_lhs_size, 1024);
        assert!(!o.range_max_precise);
    }

    #[test]
    fn presets_differ_from_default() {
        assert_ne!(SolverOptions::conservative(), SolverOptions::default());
        assert_ne!(SolverOptions::aggressive(), SolverOptions::default());
    }
}
