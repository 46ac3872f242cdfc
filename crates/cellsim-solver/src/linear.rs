//! Dense Gaussian elimination with partial pivoting.

use crate::error::SingularMatrix;

const PIVOT_EPSILON: f64 = 1e-12;

/// Row-major square matrix.
pub(crate) struct DenseSystem {
    n: usize,
    a: Vec<f64>,
    b: Vec<f64>,
}

impl DenseSystem {
    pub fn zeros(n: usize) -> Self {
        Self {
            n,
            a: vec![0.0; n * n],
            b: vec![0.0; n],
        }
    }

    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        self.a[row * self.n + col] += value;
    }

    pub fn add_rhs(&mut self, row: usize, value: f64) {
        self.b[row] += value;
    }

    /// Solve in place, consuming the system.
    // NaN pivots must be rejected too.
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn solve(mut self) -> Result<Vec<f64>, SingularMatrix> {
        let n = self.n;
        for col in 0..n {
            let mut best = col;
            let mut best_abs = self.a[col * n + col].abs();
            for row in col + 1..n {
                let v = self.a[row * n + col].abs();
                if v > best_abs {
                    best = row;
                    best_abs = v;
                }
            }
            if !(best_abs > PIVOT_EPSILON) {
                return Err(SingularMatrix {
                    column: col,
                    pivot: best_abs,
                });
            }
            if best != col {
                for k in 0..n {
                    self.a.swap(col * n + k, best * n + k);
                }
                self.b.swap(col, best);
            }
            let pivot = self.a[col * n + col];
            for row in col + 1..n {
                let factor = self.a[row * n + col] / pivot;
                if factor == 0.0 {
                    continue;
                }
                for k in col..n {
                    self.a[row * n + k] -= factor * self.a[col * n + k];
                }
                self.b[row] -= factor * self.b[col];
            }
        }

        let mut x = vec![0.0; n];
        for row in (0..n).rev() {
            let mut sum = self.b[row];
            for k in row + 1..n {
                sum -= self.a[row * n + k] * x[k];
            }
            x[row] = sum / self.a[row * n + row];
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_two_by_two() {
        // 2x + y = 5, x + 3y = 10  →  x = 1, y = 3
        let mut s = DenseSystem::zeros(2);
        s.add(0, 0, 2.0);
        s.add(0, 1, 1.0);
        s.add(1, 0, 1.0);
        s.add(1, 1, 3.0);
        s.add_rhs(0, 5.0);
        s.add_rhs(1, 10.0);
        let x = s.solve().unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn needs_pivoting() {
        // 0x + y = 2, x + y = 3
        let mut s = DenseSystem::zeros(2);
        s.add(0, 1, 1.0);
        s.add(1, 0, 1.0);
        s.add(1, 1, 1.0);
        s.add_rhs(0, 2.0);
        s.add_rhs(1, 3.0);
        let x = s.solve().unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn singular_is_reported() {
        let mut s = DenseSystem::zeros(2);
        s.add(0, 0, 1.0);
        s.add(0, 1, 1.0);
        s.add(1, 0, 2.0);
        s.add(1, 1, 2.0);
        assert!(s.solve().is_err());
    }
}
