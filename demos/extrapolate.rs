//! Fit trends of several groups, then extrapolate them after the last observed time.
//!
//! Run with `RUST_LOG=info cargo run --example extrapolate`.

use extraboost::{
    rmse, Basis, Booster, BoosterParams, FeatureMatrix, LossKind, Monitor, TreeParams,
};
use rand::prelude::*;
use std::error::Error;

/// Every group follows its own line, the groups are found from two noisy categorical features.
fn make_dataset(
    rng: &mut StdRng,
    times: &[f64],
    basis: &[Basis],
) -> Result<FeatureMatrix, Box<dyn Error>> {
    let mut inter = Vec::new();
    let mut target = Vec::new();
    let mut time = Vec::new();
    for group in 0..6 {
        let intercept = 10. + 3. * group as f64;
        let slope = 1. - 0.4 * (group % 3) as f64;
        for &t in times {
            inter.push(vec![group as f64, rng.gen_range(0..3) as f64]);
            target.push(intercept + slope * t + rng.gen::<f64>() - 0.5);
            time.push(t);
        }
    }
    Ok(FeatureMatrix::from_basis(inter, target, basis, &time, None)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let mut rng = StdRng::seed_from_u64(0);
    let basis = vec![Basis::Constant, Basis::Power(1)];

    let past: Vec<f64> = (0..40).map(|t| t as f64 * 0.25).collect();
    let future: Vec<f64> = (40..60).map(|t| t as f64 * 0.25).collect();
    let train = make_dataset(&mut rng, &past, &basis)?;
    let test = make_dataset(&mut rng, &future, &basis)?;

    let booster_params = BoosterParams {
        n_stages: 5,
        learning_rate: 0.5,
        loss: LossKind::SquaredError,
        check_zero: false,
    };
    let tree_params = TreeParams {
        lambda: 1e-3,
        max_depth: 4,
        n_threads: 2,
        ..TreeParams::new()
    };
    println!(
        "Params booster={:?} tree={:?}",
        booster_params, tree_params
    );

    let booster = Booster::build(
        &train,
        &booster_params,
        &tree_params,
        &[Monitor::new("train", &train), Monitor::new("future", &test)],
        None,
    )?;

    let yhat = booster.predict_matrix(&test, None)?;
    println!("RMSE after the training range: {:.4}", rmse(test.target(), &yhat));
    for (i, tree) in booster.trees().iter().enumerate() {
        println!(
            "Tree {}: {} leaves, depth {}",
            i,
            tree.n_leaves(),
            tree.depth()
        );
    }
    println!("{}", serde_json::to_string_pretty(&booster.learning_curves())?);
    Ok(())
}
