//! Dense output between accepted steps.

use crate::system::SolverPoint;

/// Cubic Hermite interpolation of the states between two solution points.
///
/// Uses the values and rates at both ends, so it is third-order accurate
/// regardless of the method that produced the points. `t` outside
/// `[a.t, b.t]` is extrapolated.
pub fn hermite(a: &SolverPoint, b: &SolverPoint, t: f64) -> Vec<f64> {
    let h = b.t - a.t;
    if h == 0.0 {
        return b.y.clone();
    }
    let s = (t - a.t) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;

    a.y.iter()
        .zip(&a.f)
        .zip(b.y.iter().zip(&b.f))
        .map(|((ya, fa), (yb, fb))| h00 * ya + h10 * h * fa + h01 * yb + h11 * h * fb)
        .collect()
}

/// Linear interpolation, used for algebraic variables.
pub fn linear(ta: f64, a: &[f64], tb: f64, b: &[f64], t: f64) -> Vec<f64> {
    let h = tb - ta;
    if h == 0.0 {
        return b.to_vec();
    }
    let s = (t - ta) / h;
    a.iter().zip(b).map(|(x, y)| x + s * (y - x)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(t: f64, y: f64, f: f64) -> SolverPoint {
        SolverPoint {
            t,
            y: vec![y],
            z: vec![],
            f: vec![f],
        }
    }

    #[test]
    fn reproduces_cubic_exactly() {
        // y = t^3, y' = 3t^2
        let a = point(1.0, 1.0, 3.0);
        let b = point(2.0, 8.0, 12.0);
        let y = hermite(&a, &b, 1.5);
        assert!((y[0] - 3.375).abs() < 1e-12);
    }

    #[test]
    fn endpoints_match() {
        let a = point(0.0, 1.0, -1.0);
        let b = point(0.1, 0.9, -0.9);
        assert_eq!(hermite(&a, &b, 0.0), vec![1.0]);
        assert!((hermite(&a, &b, 0.1)[0] - 0.9).abs() < 1e-15);
    }
}
