//! Decorator composition (C7, SPEC_FULL §4.8): build a stacked engine —
//! `persistent -> memo -> base` — behind the uniform `SolverEngine`
//! contract. Composition replaces subclassing: each layer owns its
//! underlying engine exclusively and forwards whatever it doesn't cache.

use crate::config::SolverOptions;
use crate::engine::{BaseEngine, SolverEngine};
use crate::ic::InstContext;
use crate::kv::{KvEngine, KvStore};
use crate::memo::MemoEngine;
use crate::oracle::Oracle;

/// Build a `SolverEngine`, wrapping the base engine with the memoization
/// decorator (C5) when `with_memo`, and then with the persistent-cache
/// decorator (C6) when a `KvStore` is supplied. Either layer may be
/// omitted independently — a caller that only wants the base engine passes
/// `with_memo = false, kv = None`.
pub fn build_engine<'a>(
    ic: &'a InstContext,
    oracle: &'a dyn Oracle,
    options: SolverOptions,
    with_memo: bool,
    kv: Option<&'a dyn KvStore>,
) -> Box<dyn SolverEngine + 'a> {
    let base = BaseEngine::new(ic, oracle, options.clone());
    match (with_memo, kv) {
        (true, Some(store)) => {
            let memo = MemoEngine::new(ic, base);
            Box::new(KvEngine::new(ic, memo, store, options))
        }
        (true, None) => Box::new(MemoEngine::new(ic, base)),
        (false, Some(store)) => Box::new(KvEngine::new(ic, base, store, options)),
        (false, None) => Box::new(base),
    }
}
