//! Built-in metric implementations.
//!
//! Every function takes ground truth and predictions of equal length and
//! returns a scalar score. Shape mismatches and empty inputs are errors,
//! never silent zeros.

use sw_types::MetricError;

fn check_shapes(y_true: &[f64], y_pred: &[f64]) -> Result<(), MetricError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricError::ShapeMismatch {
            y_true: y_true.len(),
            y_pred: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricError::EmptyInput);
    }
    Ok(())
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    check_shapes(y_true, y_pred)?;
    let sum: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    Ok(sum / y_true.len() as f64)
}

pub fn root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    Ok(mean_squared_error(y_true, y_pred)?.sqrt())
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    check_shapes(y_true, y_pred)?;
    let sum: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    Ok(sum / y_true.len() as f64)
}

pub fn r_squared(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    check_shapes(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    if ss_tot == 0.0 {
        // Constant target: perfect only when residuals are exactly zero.
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Fraction of exactly matching labels.
pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    check_shapes(y_true, y_pred)?;
    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(hits as f64 / y_true.len() as f64)
}

/// Macro-averaged F1 over the label set observed in ground truth and
/// predictions.
pub fn f1_macro(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MetricError> {
    check_shapes(y_true, y_pred)?;

    let mut labels: Vec<f64> = Vec::new();
    for &v in y_true.iter().chain(y_pred.iter()) {
        if !labels.iter().any(|&l| l == v) {
            labels.push(v);
        }
    }
    labels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut f1_sum = 0.0;
    for &label in &labels {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == label, p == label) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let denom = 2 * tp + fp + fn_;
        if denom > 0 {
            f1_sum += 2.0 * tp as f64 / denom as f64;
        }
    }
    Ok(f1_sum / labels.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mse_and_rmse() {
        let y_true = [1.0, 2.0, 3.0];
        let y_pred = [1.0, 2.0, 5.0];
        let mse = mean_squared_error(&y_true, &y_pred).unwrap();
        assert!((mse - 4.0 / 3.0).abs() < 1e-12);
        let rmse = root_mean_squared_error(&y_true, &y_pred).unwrap();
        assert!((rmse - mse.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mae_value() {
        let mae = mean_absolute_error(&[1.0, 2.0], &[2.0, 0.0]).unwrap();
        assert!((mae - 1.5).abs() < 1e-12);
    }

    #[test]
    fn r_squared_perfect_fit() {
        let y = [1.0, 2.0, 3.0, 4.0];
        assert!((r_squared(&y, &y).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn accuracy_counts_exact_matches() {
        let acc = accuracy(&[0.0, 1.0, 1.0, 0.0], &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert!((acc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn f1_macro_perfect_prediction() {
        let y = [0.0, 1.0, 0.0, 1.0];
        assert!((f1_macro(&y, &y).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let err = mean_squared_error(&[1.0, 2.0], &[1.0]).unwrap_err();
        match err {
            MetricError::ShapeMismatch { y_true: 2, y_pred: 1 } => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            accuracy(&[], &[]).unwrap_err(),
            MetricError::EmptyInput
        ));
    }
}
