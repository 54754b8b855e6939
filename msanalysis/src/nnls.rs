//! Non-negative least squares by the Lawson-Hanson active set method.
//!
//! Solves `min ||A x - b||_2` subject to `x >= 0`.
//!
//! # References
//! - Lawson C, Hanson R: Solving Least Squares Problems. Prentice-Hall, 1974, chapter 23.
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::trace;

/// The iteration budget used unless configured otherwise
pub const DEFAULT_MAX_ITER: usize = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NnlsError {
    #[error("The coefficient matrix has {rows} rows but the observation vector has {observations} entries")]
    DimensionMismatch { rows: usize, observations: usize },
    #[error("Failed to converge after {0} iterations")]
    MaxIterations(usize),
    #[error("Failed to solve the unconstrained sub-problem: {0}")]
    SubproblemFailed(String),
}

/// The solution of a non-negative least squares problem
#[derive(Debug, Clone, PartialEq)]
pub struct NnlsSolution {
    /// The non-negative coefficients
    pub x: DVector<f64>,
    /// The 2-norm of the residual `A x - b`
    pub residual: f64,
    /// The number of inner iterations taken
    pub iterations: usize,
}

fn norm_1(a: &DMatrix<f64>) -> f64 {
    a.column_iter()
        .map(|c| c.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

/// Solve the unconstrained least squares problem restricted to the `passive` columns,
/// leaving every other coefficient at zero.
fn solve_passive(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    passive: &[bool],
) -> Result<DVector<f64>, NnlsError> {
    let columns: Vec<usize> = passive
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.then_some(i))
        .collect();
    let sub = a.select_columns(columns.iter());
    let coefs = sub
        .svd(true, true)
        .solve(b, f64::EPSILON)
        .map_err(|e| NnlsError::SubproblemFailed(e.to_string()))?;

    let mut z = DVector::zeros(a.ncols());
    for (k, j) in columns.into_iter().enumerate() {
        z[j] = coefs[k];
    }
    Ok(z)
}

/// Solve `min ||A x - b||_2` subject to `x >= 0`, allowing at most `max_iter`
/// iterations of the inner loop.
pub fn nnls(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    max_iter: usize,
) -> Result<NnlsSolution, NnlsError> {
    let (m, n) = a.shape();
    if b.len() != m {
        return Err(NnlsError::DimensionMismatch {
            rows: m,
            observations: b.len(),
        });
    }

    let tol = 10.0 * f64::EPSILON * norm_1(a) * (m.max(n) as f64);
    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let mut iterations = 0;

    loop {
        let w = a.tr_mul(&(b - a * &x));
        let candidate = (0..n)
            .filter(|j| !passive[*j] && w[*j] > tol)
            .max_by(|i, j| w[*i].total_cmp(&w[*j]));
        let Some(j) = candidate else {
            break;
        };
        trace!("Moving coefficient {j} into the passive set (w = {})", w[j]);
        passive[j] = true;

        loop {
            iterations += 1;
            if iterations > max_iter {
                return Err(NnlsError::MaxIterations(max_iter));
            }

            let z = solve_passive(a, b, &passive)?;
            let feasible = (0..n).filter(|i| passive[*i]).all(|i| z[i] > tol);
            if feasible {
                x = z;
                break;
            }

            // Step from x towards z until the first passive coefficient hits zero
            let alpha = (0..n)
                .filter(|i| passive[*i] && z[*i] <= tol)
                .map(|i| {
                    let gap = x[i] - z[i];
                    if gap > 0.0 {
                        x[i] / gap
                    } else {
                        0.0
                    }
                })
                .fold(f64::INFINITY, f64::min);
            let step = (&z - &x) * alpha;
            x += step;

            for i in 0..n {
                if passive[i] && x[i] <= tol {
                    passive[i] = false;
                    x[i] = 0.0;
                }
            }
        }
    }

    let residual = (a * &x - b).norm();
    Ok(NnlsSolution {
        x,
        residual,
        iterations,
    })
}

/// The 2-norm condition number of `a`, the ratio of its largest to smallest singular value.
///
/// An empty or numerically rank-deficient matrix has an infinite condition number.
pub fn condition_number(a: &DMatrix<f64>) -> f64 {
    if a.is_empty() {
        return f64::INFINITY;
    }
    let singular_values = a.clone().svd(false, false).singular_values;
    let largest = singular_values.max();
    let smallest = singular_values.min();
    let (m, n) = a.shape();
    if smallest <= f64::EPSILON * largest * (m.max(n) as f64) {
        f64::INFINITY
    } else {
        largest / smallest
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_exact_nonnegative_solution() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_column_slice(&[2.0, 3.0, 5.0]);
        let sol = nnls(&a, &b, DEFAULT_MAX_ITER).unwrap();
        assert!((sol.x[0] - 2.0).abs() < 1e-10);
        assert!((sol.x[1] - 3.0).abs() < 1e-10);
        assert!(sol.residual < 1e-10);
    }

    #[test]
    fn test_negative_coefficient_clamped() {
        // The unconstrained solution is x = [1, -1]
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_column_slice(&[1.0, -1.0]);
        let sol = nnls(&a, &b, DEFAULT_MAX_ITER).unwrap();
        assert!((sol.x[0] - 1.0).abs() < 1e-10);
        assert_eq!(sol.x[1], 0.0);
        assert!((sol.residual - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_zero_column_stays_zero() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.5, 0.0, 0.1, 0.0]);
        let b = DVector::from_column_slice(&[2.0, 1.0, 0.2]);
        let sol = nnls(&a, &b, DEFAULT_MAX_ITER).unwrap();
        assert!((sol.x[0] - 2.0).abs() < 1e-10);
        assert_eq!(sol.x[1], 0.0);
    }

    #[test]
    fn test_overdetermined_fit() {
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.9, 0.1, 0.1, 0.9, 0.0, 1.0]);
        let truth = DVector::from_column_slice(&[4.0, 2.5]);
        let b = &a * &truth;
        let sol = nnls(&a, &b, DEFAULT_MAX_ITER).unwrap();
        assert!((&sol.x - &truth).norm() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = DMatrix::<f64>::zeros(3, 2);
        let b = DVector::<f64>::zeros(2);
        assert_eq!(
            nnls(&a, &b, 10),
            Err(NnlsError::DimensionMismatch {
                rows: 3,
                observations: 2
            })
        );
    }

    #[test]
    fn test_condition_number() {
        let identity = DMatrix::<f64>::identity(3, 3);
        assert!((condition_number(&identity) - 1.0).abs() < 1e-12);

        let scaled = DMatrix::from_row_slice(2, 2, &[10.0, 0.0, 0.0, 0.1]);
        assert!((condition_number(&scaled) - 100.0).abs() < 1e-9);

        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 2.0, 0.0]);
        assert!(condition_number(&singular).is_infinite());
    }
}
