use std::sync::Arc;

use sw_metrics::MetricRegistry;
use sw_primitives::builtin_registry;
use sw_search::{DimensionalSearch, PipelineEvaluator, SearchCaches, SearchConfig};
use sw_space::{ConfigurationSpace, PipelineTemplate, StepChoice, TemplateNode};
use sw_types::{ArgumentSource, MetricDescriptor, NamedValues, OutputRef, Table, Value};

fn dataset(rows: std::ops::Range<usize>) -> NamedValues {
    // y = 3*x0 - 2*x1, with a missing cell sprinkled in.
    let mut x0 = Vec::new();
    let mut x1 = Vec::new();
    let mut y = Vec::new();
    for i in rows {
        let a = i as f64;
        let b = (i % 5) as f64;
        x0.push(if i % 11 == 3 { f64::NAN } else { a });
        x1.push(b);
        y.push(3.0 * a - 2.0 * b);
    }
    let table = Table::new(vec!["x0".into(), "x1".into()], vec![x0, x1]).unwrap();
    NamedValues::from([
        ("inputs".to_string(), Value::table(table)),
        ("outputs".to_string(), Value::column(y)),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🔍 Stepwise basic search example");

    let train = dataset(0..40);
    let test = dataset(10..20);

    // Fixed three-position skeleton: clean → rescale → predict.
    let template = PipelineTemplate::new()
        .node(TemplateNode::new("impute").arg("inputs", ArgumentSource::input("inputs")))
        .node(TemplateNode::new("scale").arg("inputs", ArgumentSource::step("impute")))
        .node(
            TemplateNode::new("model")
                .arg("inputs", ArgumentSource::step("scale"))
                .arg("outputs", ArgumentSource::input("outputs")),
        )
        .output(OutputRef::main("model"));

    let space = ConfigurationSpace::new()
        .add_dimension("impute", vec![StepChoice::new("impute.mean")])
        .add_dimension(
            "scale",
            vec![
                StepChoice::new("scale.standard"),
                StepChoice::new("select.variance_threshold"),
            ],
        )
        .add_weighted(
            "model",
            vec![
                StepChoice::new("model.mean_regressor"),
                StepChoice::new("model.knn_regressor")
                    .with_hyperparam("k", serde_json::json!(3)),
                StepChoice::new("model.knn_regressor")
                    .with_hyperparam("k", serde_json::json!(1)),
                StepChoice::new("model.ridge_regressor")
                    .with_hyperparam("alpha", serde_json::json!(0.1)),
            ],
            vec![1.0, 2.0, 2.0, 3.0],
        );

    let evaluator = PipelineEvaluator::new(
        template,
        Arc::new(builtin_registry()),
        Arc::new(MetricRegistry::builtin()),
        vec![MetricDescriptor::new("mean_squared_error")],
        train,
        test,
    )?;

    let config = SearchConfig::default()
        .with_max_per_dimension(3)
        .with_num_iterations(2)
        .with_num_workers(2);
    let search = DimensionalSearch::new(evaluator, space, config)?;
    println!("Searching with {} workers", search.num_workers());

    let caches = SearchCaches::new();
    let report = search.search(None, &caches)?;

    println!("Best pipeline: {}", report.best.describe());
    println!("Best mean_squared_error: {:.6}", report.best_value);
    println!("Reward: {:.6}", report.reward);
    println!(
        "Candidates evaluated: {} in {:.2}s",
        report.candidates_simulated, report.elapsed_seconds
    );
    let stats = caches.step.stats();
    println!(
        "Step cache: {} entries, hit rate {:.2}",
        caches.step.len(),
        stats.hit_rate()
    );

    Ok(())
}
