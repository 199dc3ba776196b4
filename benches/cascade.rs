use criterion::{criterion_group, criterion_main, Criterion};

use peephole_solver::config::SolverOptions;
use peephole_solver::ic::{InstContext, Kind};
use peephole_solver::oracle::BruteForceOracle;
use peephole_solver::synthesis::ExhaustiveSynthesizer;
use peephole_solver::{cascade, BaseEngine, SolverEngine};

fn and_with_zero(c: &mut Criterion) {
    let ic = InstContext::new();
    let oracle = BruteForceOracle::new();
    let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
    let x = ic.var("x", 8);
    let lhs = ic.op(Kind::And, 8, vec![x, ic.const_u64(8, 0)]);

    c.bench_function("infer_and_with_zero", |b| {
        b.iter(|| engine.infer(&vec![], &vec![], &lhs).unwrap());
    });
}

fn no_op_nop_search(c: &mut Criterion) {
    let ic = InstContext::new();
    let oracle = BruteForceOracle::new();
    let x = ic.var("x", 8);
    let y = ic.var("y", 8);
    let lhs = ic.op(
        Kind::Add,
        8,
        vec![ic.op(Kind::Xor, 8, vec![x.clone(), y.clone()]), ic.const_u64(8, 0)],
    );
    let mut opts = SolverOptions::default();
    opts.infer_ints = false;
    opts.infer_nop = true;
    let synth = ExhaustiveSynthesizer;

    c.bench_function("infer_no_op_over_xor_add_zero", |b| {
        b.iter(|| cascade::infer(&ic, &oracle, &vec![], &vec![], &lhs, &opts, &synth).unwrap());
    });
}

fn known_bits_on_or_mask(c: &mut Criterion) {
    let ic = InstContext::new();
    let oracle = BruteForceOracle::new();
    let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
    let x = ic.var("x", 16);
    let lhs = ic.op(Kind::Or, 16, vec![x, ic.const_u64(16, 0x00FF)]);

    c.bench_function("known_bits_or_mask_16", |b| {
        b.iter(|| engine.known_bits(&vec![], &vec![], &lhs).unwrap());
    });
}

fn width_matrix(c: &mut Criterion) {
    for width in [4u32, 8, 12, 16] {
        let ic = InstContext::new();
        let oracle = BruteForceOracle::new();
        let engine = BaseEngine::new(&ic, &oracle, SolverOptions::default());
        let x = ic.var("x", width);
        let lhs = ic.op(Kind::Sub, width, vec![x.clone(), x]);

        c.bench_function(&format!("infer_sub_self_width_{width}"), |b| {
            b.iter(|| engine.infer(&vec![], &vec![], &lhs).unwrap());
        });
    }
}

criterion_group!(benches, and_with_zero, no_op_nop_search, known_bits_on_or_mask, width_matrix);
criterion_main!(benches);
