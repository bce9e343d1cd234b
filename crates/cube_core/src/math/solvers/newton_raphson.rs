//! Newton-Raphson root-finding solver.

use super::SolverConfig;
use crate::types::SolverError;
use num_traits::Float;

/// Newton-Raphson root finder with optional iterate clamping.
///
/// Uses Newton's method: `x_{n+1} = x_n - f(x_n) / f'(x_n)`. When bounds are
/// set, every iterate is clamped to `[lower, upper]` before the next step,
/// which keeps functions with poles (such as `(1+r)^-t` at `r = -1`) from
/// diverging.
///
/// # Example
///
/// ```
/// use cube_core::math::solvers::{NewtonRaphsonSolver, SolverConfig};
///
/// let solver = NewtonRaphsonSolver::new(SolverConfig::default()).with_bounds(0.0, 10.0);
///
/// // x² - 4 has roots at ±2; the bounds keep us on the positive one.
/// let root = solver.find_root(|x: f64| x * x - 4.0, |x: f64| 2.0 * x, 3.0).unwrap();
/// assert!((root - 2.0).abs() < 1e-10);
/// ```
#[derive(Debug, Clone)]
pub struct NewtonRaphsonSolver<T: Float> {
    config: SolverConfig<T>,
    bounds: Option<(T, T)>,
}

impl<T: Float> NewtonRaphsonSolver<T> {
    /// Create a new Newton-Raphson solver with the given configuration.
    pub fn new(config: SolverConfig<T>) -> Self {
        Self {
            config,
            bounds: None,
        }
    }

    /// Create a solver with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(SolverConfig::default())
    }

    /// Clamp every iterate to `[lower, upper]`.
    pub fn with_bounds(mut self, lower: T, upper: T) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// Find a root of `f` using explicit derivative `f_prime`.
    ///
    /// # Returns
    ///
    /// * `Ok(x)` - two successive iterates closer than `tolerance`, or
    ///   `|f(x)| < tolerance` when the residual check is enabled
    /// * `Err(SolverError::MaxIterationsExceeded)` - Failed to converge; carries the last iterate
    /// * `Err(SolverError::DerivativeNearZero)` - Derivative too small
    /// * `Err(SolverError::NumericalInstability)` - Iterate became non-finite
    pub fn find_root<F, G>(&self, f: F, f_prime: G, x0: T) -> Result<T, SolverError>
    where
        F: Fn(T) -> T,
        G: Fn(T) -> T,
    {
        let mut x = self.clamp(x0);
        let epsilon = T::from(1e-30).unwrap_or_else(T::min_positive_value);

        for _iteration in 0..self.config.max_iterations {
            let f_val = f(x);

            if self.config.residual_check && f_val.abs() < self.config.tolerance {
                return Ok(x);
            }

            let f_prime_val = f_prime(x);

            if f_prime_val.abs() < epsilon {
                return Err(SolverError::DerivativeNearZero {
                    x: x.to_f64().unwrap_or(f64::NAN),
                });
            }

            let next = self.clamp(x - f_val / f_prime_val);

            if !next.is_finite() {
                return Err(SolverError::NumericalInstability(
                    "Newton iteration produced non-finite value".to_string(),
                ));
            }

            if (next - x).abs() < self.config.tolerance {
                return Ok(next);
            }
            x = next;
        }

        Err(SolverError::MaxIterationsExceeded {
            iterations: self.config.max_iterations,
            last: x.to_f64().unwrap_or(f64::NAN),
        })
    }

    /// Returns a reference to the solver configuration.
    pub fn config(&self) -> &SolverConfig<T> {
        &self.config
    }

    fn clamp(&self, x: T) -> T {
        match self.bounds {
            Some((lower, upper)) => x.max(lower).min(upper),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================
    // Basic Functionality Tests
    // ========================================

    #[test]
    fn test_find_sqrt_2() {
        let solver = NewtonRaphsonSolver::new(SolverConfig::default());
        let root = solver
            .find_root(|x: f64| x * x - 2.0, |x: f64| 2.0 * x, 1.0)
            .unwrap();
        assert!(
            (root - std::f64::consts::SQRT_2).abs() < 1e-10,
            "Expected √2, got {}",
            root
        );
    }

    #[test]
    fn test_bounds_clamp_iterates() {
        // Starting at 0.5 the unclamped step for x³ - 8 jumps far right.
        let solver = NewtonRaphsonSolver::new(SolverConfig::new(1e-10, 200)).with_bounds(0.0, 3.0);
        let root = solver
            .find_root(|x: f64| x * x * x - 8.0, |x: f64| 3.0 * x * x, 0.5)
            .unwrap();
        assert!((root - 2.0).abs() < 1e-8);
    }

    #[test]
    fn test_with_f32() {
        let solver: NewtonRaphsonSolver<f32> = NewtonRaphsonSolver::new(SolverConfig::new(1e-5, 100));
        let root = solver
            .find_root(|x: f32| x * x - 2.0, |x: f32| 2.0 * x, 1.0_f32)
            .unwrap();
        assert!((root - std::f32::consts::SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn test_step_only_ignores_small_residual() {
        // f is tiny everywhere, so the residual test would accept the start point.
        let f = |x: f64| 1e-6 * (x - 2.0);
        let f_prime = |_x: f64| 1e-6;

        let residual = NewtonRaphsonSolver::new(SolverConfig::new(1e-4, 100));
        assert_eq!(residual.find_root(f, f_prime, 0.5).unwrap(), 0.5);

        let step_only =
            NewtonRaphsonSolver::new(SolverConfig::new(1e-4, 100).with_residual_check(false));
        assert!((step_only.find_root(f, f_prime, 0.5).unwrap() - 2.0).abs() < 1e-10);
    }

    // ========================================
    // Error Handling Tests
    // ========================================

    #[test]
    fn test_derivative_near_zero() {
        let solver = NewtonRaphsonSolver::new(SolverConfig::default());
        let result = solver.find_root(|x: f64| x * x * x + 1.0, |_x: f64| 0.0, 0.5);

        match result.unwrap_err() {
            SolverError::DerivativeNearZero { x } => assert!((x - 0.5).abs() < 1e-12),
            other => panic!("Expected DerivativeNearZero error, got {:?}", other),
        }
    }

    #[test]
    fn test_max_iterations_reports_last_iterate() {
        // x² + 1 has no real root; with bounds the iterates bounce inside [−1, 1].
        let solver = NewtonRaphsonSolver::new(SolverConfig::new(1e-12, 3)).with_bounds(-1.0, 1.0);
        let result = solver.find_root(|x: f64| x * x + 1.0, |x: f64| 2.0 * x, 0.5);

        match result.unwrap_err() {
            SolverError::MaxIterationsExceeded { iterations, last } => {
                assert_eq!(iterations, 3);
                assert!((-1.0..=1.0).contains(&last));
            }
            other => panic!("Expected MaxIterationsExceeded error, got {:?}", other),
        }
    }
}
