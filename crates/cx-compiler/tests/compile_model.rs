//! Integration tests for cx-compiler.

use std::sync::Arc;
use std::thread;

use cx_compiler::{CompileError, NumericDomainError, RoutineCache, compile};
use cx_model::{EquationModel, Expr, ModelBuilder};
use proptest::prelude::*;

/// Van der Pol oscillator: x' = v, v' = mu*(1 - x^2)*v - x
fn van_der_pol(mu: f64) -> EquationModel {
    let mut b = ModelBuilder::new("van_der_pol");
    b.add_constant("mu", mu);
    b.add_state("x", 2.0, Expr::var("v"));
    b.add_state(
        "v",
        0.0,
        Expr::var("mu") * (Expr::num(1.0) - Expr::var("x").pow(Expr::num(2.0))) * Expr::var("v")
            - Expr::var("x"),
    );
    b.build().unwrap()
}

#[test]
fn derivative_matches_direct_evaluation() {
    let model = van_der_pol(1.5);
    let set = compile(&model).unwrap();
    let mut out = [0.0; 2];
    set.derivative
        .call(0.0, &[0.5, -1.0], &[], model.constants(), &mut out)
        .unwrap();
    assert!((out[0] - (-1.0)).abs() < 1e-12);
    let expected = 1.5 * (1.0 - 0.25) * -1.0 - 0.5;
    assert!((out[1] - expected).abs() < 1e-12);
}

#[test]
fn symbolic_jacobian_matches_finite_differences() {
    let model = van_der_pol(1.5);
    let set = compile(&model).unwrap();
    let jac = set.jacobian.as_ref().unwrap();

    let y = [0.7, -0.3];
    let c = model.constants();
    let mut j = [0.0; 4];
    jac.call(0.0, &y, &[], c, &mut j).unwrap();

    let mut f0 = [0.0; 2];
    set.derivative.call(0.0, &y, &[], c, &mut f0).unwrap();
    let eps = 1e-7;
    for col in 0..2 {
        let mut yp = y;
        yp[col] += eps;
        let mut f1 = [0.0; 2];
        set.derivative.call(0.0, &yp, &[], c, &mut f1).unwrap();
        for row in 0..2 {
            let fd = (f1[row] - f0[row]) / eps;
            assert!(
                (j[row * 2 + col] - fd).abs() < 1e-5,
                "J[{row},{col}] = {} vs {fd}",
                j[row * 2 + col]
            );
        }
    }
}

#[test]
fn division_by_zero_signals_domain_error() {
    let mut b = ModelBuilder::new("hyperbola");
    b.add_state("y", 1.0, Expr::num(1.0) / Expr::var("y"));
    let model = b.build().unwrap();
    let set = compile(&model).unwrap();

    let input = [0.0];
    let mut out = [0.0];
    let err = set
        .derivative
        .call(0.0, &input, &[], &[], &mut out)
        .unwrap_err();
    assert_eq!(err, NumericDomainError::DivisionByZero);
    // Input untouched.
    assert_eq!(input, [0.0]);
}

#[test]
fn piecewise_guards_logarithm() {
    // y' = if y > 0 then ln(y) else 0
    let mut b = ModelBuilder::new("guarded");
    b.add_state(
        "y",
        1.0,
        Expr::if_then_else(
            Expr::var("y").gt(Expr::num(0.0)),
            Expr::var("y").ln(),
            Expr::num(0.0),
        ),
    );
    let set = compile(&b.build().unwrap()).unwrap();
    let mut out = [1.0];
    set.derivative.call(0.0, &[-2.0], &[], &[], &mut out).unwrap();
    assert_eq!(out[0], 0.0);
    set.derivative.call(0.0, &[1.0], &[], &[], &mut out).unwrap();
    assert_eq!(out[0], 0.0);
}

#[test]
fn time_dependent_rate() {
    let mut b = ModelBuilder::new("forced");
    b.add_state("y", 0.0, Expr::time().sin());
    let set = compile(&b.build().unwrap()).unwrap();
    let mut out = [0.0];
    set.derivative.call(0.5, &[0.0], &[], &[], &mut out).unwrap();
    assert!((out[0] - 0.5_f64.sin()).abs() < 1e-15);
}

#[test]
fn arity_mismatch_is_compilation_error() {
    let mut b = ModelBuilder::new("bad");
    b.add_state("y", 1.0, Expr::call("pow", vec![Expr::var("y")]));
    let err = compile(&b.build().unwrap()).unwrap_err();
    assert!(matches!(
        err,
        CompileError::ArityMismatch { expected: 2, actual: 1, .. }
    ));
}

#[test]
fn dae_residual_is_compiled_without_jacobian() {
    let mut b = ModelBuilder::new("dae");
    b.add_constant("a", 3.0);
    b.add_state("x", 1.0, -Expr::var("z"));
    b.add_algebraic("z", 0.0);
    b.add_residual(Expr::var("z") - Expr::var("a") * Expr::var("x"));
    let model = b.build().unwrap();
    let set = compile(&model).unwrap();

    assert!(!set.has_jacobian());
    let residual = set.residual.as_ref().unwrap();
    let mut r = [0.0];
    residual
        .call(0.0, &[2.0], &[6.0], model.constants(), &mut r)
        .unwrap();
    assert_eq!(r[0], 0.0);
}

#[test]
fn routines_are_shared_across_threads() {
    let cache = RoutineCache::new();
    let model = van_der_pol(0.5);
    let set = cache.get_or_compile(&model).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let set = Arc::clone(&set);
            let constants = model.constants().to_vec();
            thread::spawn(move || {
                let mut out = [0.0; 2];
                let x = i as f64;
                set.derivative
                    .call(0.0, &[x, 1.0], &[], &constants, &mut out)
                    .unwrap();
                out
            })
        })
        .collect();

    for (i, h) in handles.into_iter().enumerate() {
        let out = h.join().unwrap();
        let x = i as f64;
        assert_eq!(out[0], 1.0);
        assert!((out[1] - (0.5 * (1.0 - x * x) - x)).abs() < 1e-12);
    }
}

proptest! {
    #[test]
    fn compiled_polynomial_matches_closed_form(y in -10.0_f64..10.0, k in -5.0_f64..5.0) {
        // y' = k*y^2 + 3*y - k
        let mut b = ModelBuilder::new("poly");
        b.add_constant("k", k);
        b.add_state(
            "y",
            0.0,
            Expr::var("k") * Expr::var("y") * Expr::var("y") + Expr::num(3.0) * Expr::var("y")
                - Expr::var("k"),
        );
        let model = b.build().unwrap();
        let set = compile(&model).unwrap();
        let mut out = [0.0];
        set.derivative.call(0.0, &[y], &[], &[k], &mut out).unwrap();
        let expected = k * y * y + 3.0 * y - k;
        prop_assert!((out[0] - expected).abs() <= 1e-9 * (1.0 + expected.abs()));
    }
}
