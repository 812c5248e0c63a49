use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use rai_diagnostics::balance::DataBalanceAnalyzer;
use rai_diagnostics::causal::{CausalAnalyzer, CausalConfig, CausalMethod, Variable};
use rai_diagnostics::counterfactual::{CounterfactualAnalyzer, CounterfactualConfig};
use rai_diagnostics::data::Dataset;
use rai_diagnostics::error_analysis::ErrorAnalyzer;
use rai_diagnostics::prediction::DesiredOutcome;
use rai_diagnostics::Result;
use rand::prelude::*;

fn create_tabular_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = rand::thread_rng();
    let mut data = Dataset::new();
    for i in 0..n_features {
        let values: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect();
        data = data.with_continuous(format!("feature_{}", i), values).unwrap();
    }
    let segment: Vec<&str> = (0..n_rows).map(|_| ["a", "b", "c"][rng.gen_range(0..3)]).collect();
    data.with_categorical("segment", segment).unwrap()
}

fn threshold_model(batch: &Dataset) -> Result<Array1<f64>> {
    let f = batch.numeric_column("feature_0")?;
    Ok(f.mapv(|v| if v > 5.0 { 1.0 } else { 0.0 }))
}

fn bench_error_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("error_analysis");
    group.sample_size(10);

    for n_rows in [1000, 5000].iter() {
        let data = create_tabular_data(*n_rows, 5);
        let y_true = threshold_model(&data).unwrap();
        let y_pred: Array1<f64> = y_true.iter().enumerate().map(|(i, &v)| if i % 7 == 0 { 1.0 - v } else { v }).collect();

        group.bench_with_input(BenchmarkId::new("analyze", n_rows), &data, |b, data| {
            b.iter(|| {
                ErrorAnalyzer::default()
                    .analyze(black_box(data), &y_true, &y_pred, None, None)
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_counterfactuals(c: &mut Criterion) {
    let mut group = c.benchmark_group("counterfactual");
    group.sample_size(10);

    let reference = create_tabular_data(2000, 5);
    let mut analyzer = CounterfactualAnalyzer::new(CounterfactualConfig::default());
    analyzer.fit(&reference, None).unwrap();
    let instance = reference.row(0).unwrap();

    group.bench_function("generate", |b| {
        b.iter(|| {
            analyzer
                .generate_counterfactuals(black_box(&instance), &threshold_model, &DesiredOutcome::Exact(1.0), 0)
                .unwrap()
        })
    });

    group.finish();
}

fn bench_causal(c: &mut Criterion) {
    let mut group = c.benchmark_group("causal");
    group.sample_size(10);

    let data = create_tabular_data(2000, 4);
    for method in [CausalMethod::Linear, CausalMethod::Forest, CausalMethod::MetaLearner] {
        group.bench_with_input(BenchmarkId::new("fit", method), &data, |b, data| {
            b.iter(|| {
                let mut analyzer = CausalAnalyzer::new(CausalConfig::default().with_method(method));
                analyzer
                    .fit(
                        black_box(data),
                        Variable::Column("feature_0".into()),
                        Variable::Column("feature_1".into()),
                        None,
                    )
                    .unwrap();
                analyzer.estimate_ate().unwrap()
            })
        });
    }

    group.finish();
}

fn bench_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("balance");

    for n_rows in [1000, 10000].iter() {
        let data = create_tabular_data(*n_rows, 5);
        group.bench_with_input(BenchmarkId::new("analyze", n_rows), &data, |b, data| {
            b.iter(|| {
                DataBalanceAnalyzer::default()
                    .analyze(black_box(data), Some("segment"), Some(&["segment".to_string()]), None)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_error_analysis, bench_counterfactuals, bench_causal, bench_balance);
criterion_main!(benches);
