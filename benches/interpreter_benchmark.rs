//! Benchmarks for the program interpreter, builder and fitness cache.

#![allow(missing_docs)] // Benchmark macros generate undocumented functions
#![allow(clippy::unwrap_used)]

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use sylva::builder::BuilderConfig;
use sylva::gp::{
    CrossoverConfig, FitnessConfig, FitnessEvaluator, Individual, MutationConfig, crossover, mutate,
};
use sylva::{
    EvalResult, Environment, GenerationMode, Node, Op, ProgramBuilder, ProgramSpace, RunContext,
    Signature, Value, ValueType,
};

fn space() -> ProgramSpace {
    let double = ValueType::Double;
    let nodes = vec![
        Node::op(Op::Add, double),
        Node::op(Op::Sub, double),
        Node::op(Op::Mul, double),
        Node::op(Op::Div, double),
        Node::if_else(double),
        Node::op(Op::Gt, double),
        Node::variable("x", double),
        Node::ephemeral(double, -1.0, 1.0),
    ];
    ProgramSpace::new(vec![Signature::new(double, 2, 8)], vec![nodes]).unwrap()
}

fn error(ind: &Individual, ctx: &mut RunContext) -> EvalResult<f64> {
    let mut total = 0.0;
    for i in 0..20 {
        let x = f64::from(i) / 10.0;
        ctx.reset();
        ctx.env.bind("x", Value::Double(x));
        total += (ind.execute_double(ctx)? - x * x).abs();
    }
    Ok(total)
}

fn bench_execute(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let space = space();
    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(1);
    let programs: Vec<Individual> = (0..100)
        .map(|_| builder.build_individual(GenerationMode::Full, &mut rng).unwrap())
        .collect();
    let env = Environment::new().with("x", Value::Double(0.5));

    c.bench_function("execute_full_depth8_x100", |b| {
        b.iter(|| {
            for ind in &programs {
                let mut ctx = RunContext::new(env.clone(), 1_000_000);
                let _ = black_box(ind.execute_double(&mut ctx));
            }
        });
    });
}

fn bench_build(c: &mut Criterion) {
    let space = space();
    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(2);

    c.bench_function("build_ramped_population_500", |b| {
        b.iter(|| black_box(builder.build_population(500, &mut rng).unwrap()));
    });
}

fn bench_operators(c: &mut Criterion) {
    let space = space();
    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(3);
    let a = builder.build_individual(GenerationMode::Full, &mut rng).unwrap();
    let b = builder.build_individual(GenerationMode::Grow, &mut rng).unwrap();

    c.bench_function("crossover", |bench| {
        bench.iter(|| black_box(crossover(&a, &b, &space, &CrossoverConfig::default(), &mut rng)));
    });
    c.bench_function("mutate", |bench| {
        bench.iter(|| black_box(mutate(&a, &space, &MutationConfig::default(), &mut rng)));
    });
}

fn bench_evaluate_population(c: &mut Criterion) {
    let space = space();
    let builder = ProgramBuilder::new(&space, BuilderConfig::default());
    let mut rng = SmallRng::seed_from_u64(4);
    let population = builder.build_population(500, &mut rng).unwrap();

    c.bench_function("evaluate_population_500_uncached", |b| {
        b.iter(|| {
            let evaluator = FitnessEvaluator::new(error, FitnessConfig::default());
            let mut pop = population.clone();
            evaluator.evaluate_population(&mut pop, true);
            black_box(pop)
        });
    });
}

criterion_group!(
    benches,
    bench_execute,
    bench_build,
    bench_operators,
    bench_evaluate_population
);
criterion_main!(benches);
