use crate::CxError;

/// Floating point type used throughout system
pub type Real = f64;

/// Absolute/relative error tolerance pair.
///
/// A quantity `e` measured against a reference `v` is acceptable when
/// `|e| <= abs + rel * |v|`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-7,
            rel: 1e-7,
        }
    }
}

impl Tolerances {
    pub fn new(abs: Real, rel: Real) -> Result<Self, CxError> {
        if !(abs > 0.0 && abs.is_finite()) {
            return Err(CxError::BadTolerance {
                which: "absolute",
                value: abs,
            });
        }
        if !(rel > 0.0 && rel.is_finite()) {
            return Err(CxError::BadTolerance {
                which: "relative",
                value: rel,
            });
        }
        Ok(Self { abs, rel })
    }

    /// Error weight for a component with magnitude `value`.
    #[inline]
    pub fn scale(&self, value: Real) -> Real {
        self.abs + self.rel * value.abs()
    }
}

/// `|error| <= abs + rel * |value|`
#[inline]
pub fn within_tolerance(error: Real, value: Real, tol: Tolerances) -> bool {
    error.abs() <= tol.scale(value)
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, CxError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CxError::NonFinite { what, value: v })
    }
}

/// Largest component of `error` measured in units of the tolerance at the
/// matching entry of `reference`.
///
/// A result `<= 1.0` means every component passes [`within_tolerance`].
/// Empty vectors give `0.0`; a NaN component gives NaN, which fails any
/// `<= 1.0` test.
pub fn max_scaled_error(error: &[Real], reference: &[Real], tol: Tolerances) -> Real {
    let mut worst: Real = 0.0;
    for (e, v) in error.iter().zip(reference) {
        let r = e.abs() / tol.scale(*v);
        if r.is_nan() {
            return Real::NAN;
        }
        worst = worst.max(r);
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(Real::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("not finite"));
    }

    #[test]
    fn tolerance_rule_mixes_abs_and_rel() {
        let tol = Tolerances::new(1e-6, 1e-3).unwrap();
        assert!(within_tolerance(1e-6, 0.0, tol));
        assert!(!within_tolerance(2e-6, 0.0, tol));
        assert!(within_tolerance(1e-3, 1.0, tol));
        assert!(within_tolerance(-1e-3, -1.0, tol));
    }

    #[test]
    fn tolerances_reject_non_positive() {
        assert!(Tolerances::new(0.0, 1e-6).is_err());
        assert!(Tolerances::new(1e-6, -1.0).is_err());
        assert!(Tolerances::new(f64::NAN, 1e-6).is_err());
    }

    #[test]
    fn one_component_out_of_tolerance_fails_the_vector() {
        let tol = Tolerances::new(1e-6, 1e-6).unwrap();
        let error = [1.9e-6, 0.0, 0.0, 0.0];
        let reference = [0.0; 4];
        assert!(!within_tolerance(error[0], reference[0], tol));
        assert!((max_scaled_error(&error, &reference, tol) - 1.9).abs() < 1e-12);
        assert_eq!(max_scaled_error(&[], &[], tol), 0.0);
        assert!(max_scaled_error(&[f64::NAN], &[0.0], tol).is_nan());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn scaled_error_agrees_with_componentwise_rule(
            pairs in prop::collection::vec((-1e-2_f64..1e-2, -10.0_f64..10.0), 0..16)
        ) {
            let tol = Tolerances { abs: 1e-4, rel: 1e-3 };
            let (error, reference): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let all_within = error
                .iter()
                .zip(&reference)
                .all(|(e, v)| within_tolerance(*e, *v, tol));
            prop_assert_eq!(max_scaled_error(&error, &reference, tol) <= 1.0, all_within);
        }

        #[test]
        fn tolerance_scale_grows_with_magnitude(v in 0.0_f64..1e6) {
            let tol = Tolerances { abs: 1e-6, rel: 1e-4 };
            prop_assert!(tol.scale(v) >= tol.scale(0.0));
            prop_assert!(within_tolerance(tol.scale(v), v, tol));
        }
    }
}
