//! peephole-solver — a peephole superoptimizer's solver engine.
//!
//! Given an interned integer-IR expression (the left-hand side of a rewrite)
//! and a path condition, this crate infers a replacement expression (the
//! right-hand side) that is provably equivalent under every reachable
//! assignment, or proves facts about the expression's value (known bits,
//! sign, range, demanded bits) without necessarily replacing it.
//!
//! # Layout
//!
//! - [`ic`] — the hash-consed expression DAG (`InstContext`, `InstRef`, `Kind`).
//! - [`pc`] — path conditions and block path conditions.
//! - [`apint`] — arbitrary-precision, width-tagged two's-complement integers.
//! - [`oracle`] — the `Oracle` trait (the SMT boundary) and a brute-force
//!   reference implementation.
//! - [`rewriter`] — structural copy-with-substitution and single-bit rewrites.
//! - [`prober`] — abstract-domain queries built on "prove NOT P is UNSAT".
//! - [`synthesis`] — the constant and full-instruction synthesis boundaries.
//! - [`cascade`] — the `infer`/`is_valid` strategy cascade (C4).
//! - [`fingerprint`] — canonical query text, used as cache keys and the
//!   oracle's wire format.
//! - [`engine`] — the uniform `SolverEngine` contract and `BaseEngine`.
//! - [`memo`] — the in-process memoization decorator (C5).
//! - [`kv`] — the persistent external cache decorator (C6).
//! - [`compose`] — decorator composition (C7): `build_engine`.
//! - [`config`] — `SolverOptions`.
//! - [`error`] — `SolverError`.
//! - [`stats`] — the monotonic counters every decorator exposes.
//!
//! # Quick start
//!
//! ```rust
//! use peephole_solver::{BaseEngine, SolverEngine, SolverOptions};
//! use peephole_solver::ic::{InstContext, Kind};
//! use peephole_solver::oracle::BruteForceOracle;
//!
//! let ic = InstContext::new();
//! let oracle = BruteForceOracle::new();
//! let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
//!
//! let x = ic.var("x", 8);
//! let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);
//! let rhs = engine.infer(&vec![], &vec![], &lhs).unwrap();
//! assert!(rhs.is_some());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_arguments)]

pub mod apint;
pub mod cascade;
pub mod compose;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod ic;
pub mod kv;
pub mod memo;
pub mod oracle;
pub mod pc;
pub mod prober;
pub mod rewriter;
pub mod stats;
pub mod synthesis;

pub use compose::build_engine;
pub use config::SolverOptions;
pub use engine::{BaseEngine, SolverEngine};
pub use error::{Result, SolverError};
pub use kv::{InMemoryKvStore, KvEngine, KvStore};
pub use memo::MemoEngine;
pub use stats::{Stats, StatsSnapshot};
