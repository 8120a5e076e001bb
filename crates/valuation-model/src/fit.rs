use market_core::{MarketError, MarketResult};
use nalgebra::{DMatrix, DVector};

/// Ridge-regularized least squares on the normal equations.
///
/// Column 0 of `rows` is the intercept and is never penalized. The penalty is
/// `lambda * n` so the same `lambda` behaves alike for small and large batches.
/// Cholesky first; SVD when the system is not positive definite (`lambda = 0`
/// with collinear columns).
pub fn ridge_solve(rows: &[Vec<f64>], targets: &[f64], lambda: f64) -> MarketResult<Vec<f64>> {
    let n = rows.len();
    let p = rows.first().map_or(0, Vec::len);
    if n == 0 || p == 0 || targets.len() != n {
        return Err(MarketError::insufficient("regression fit", 1, n));
    }

    let x = DMatrix::from_fn(n, p, |i, j| rows[i][j]);
    let y = DVector::from_column_slice(targets);

    let mut xtx = x.transpose() * &x;
    let penalty = lambda.max(0.0) * n as f64;
    for j in 1..p {
        xtx[(j, j)] += penalty;
    }
    let xty = x.transpose() * y;

    let beta = match xtx.clone().cholesky() {
        Some(cholesky) => cholesky.solve(&xty),
        None => {
            tracing::debug!(
                features = p,
                samples = n,
                "normal equations not positive definite, using SVD"
            );
            xtx.svd(true, true)
                .solve(&xty, 1e-10)
                .map_err(|e| MarketError::config(format!("regression solve failed: {e}")))?
        }
    };

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(MarketError::config("regression produced non-finite coefficients"));
    }
    Ok(beta.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_recovers_exact_line() {
        // y = 3 + 2x
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| 3.0 + 2.0 * i as f64).collect();
        let beta = ridge_solve(&rows, &targets, 0.0).unwrap();
        assert_relative_eq!(beta[0], 3.0, epsilon = 1e-8);
        assert_relative_eq!(beta[1], 2.0, epsilon = 1e-8);
    }

    #[test]
    fn test_collinear_columns_still_solve() {
        let rows: Vec<Vec<f64>> = (0..8).map(|i| vec![1.0, i as f64, 2.0 * i as f64]).collect();
        let targets: Vec<f64> = (0..8).map(|i| 1.0 + 5.0 * i as f64).collect();
        let beta = ridge_solve(&rows, &targets, 0.0).unwrap();
        let predicted = beta[0] + beta[1] * 4.0 + beta[2] * 8.0;
        assert_relative_eq!(predicted, 21.0, epsilon = 1e-4);
    }

    #[test]
    fn test_penalty_shrinks_slope_not_intercept() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64 - 4.5]).collect();
        let targets: Vec<f64> = rows.iter().map(|r| 10.0 + 4.0 * r[1]).collect();
        let beta = ridge_solve(&rows, &targets, 1.0).unwrap();
        assert_relative_eq!(beta[0], 10.0, epsilon = 1e-9);
        assert!(beta[1] < 4.0 && beta[1] > 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            ridge_solve(&[], &[], 0.1),
            Err(MarketError::InsufficientData { .. })
        ));
    }
}
