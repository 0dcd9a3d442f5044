//! Solve-layer behavior: strategy dispatch, condition soft-fails, the
//! aliasing guard, and workspace-pool transparency.

use approx::assert_abs_diff_eq;
use densolve::{Dense, Error, Matrix, Vector, REGION_OVERLAP};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn near_singular_system_returns_answer_with_diagnostic() {
    // The second row differs from the first by one ulp, so the system is
    // still solvable but its condition number crosses the threshold. The
    // exact solution [1, 1] is nevertheless delivered.
    let eps = f64::EPSILON;
    let a = Dense::with_data(2, 2, vec![1.0, 1.0, 1.0, 1.0 + eps]);
    let b = Dense::with_data(2, 1, vec![2.0, 2.0 + eps]);
    let mut x = Dense::default();
    match x.solve(&a, &b) {
        Err(Error::Condition(cond)) => {
            assert!(cond.is_finite(), "cond = {cond}");
            assert!(cond > 1e16, "cond = {cond}");
        }
        other => panic!("expected a Condition diagnostic, got {other:?}"),
    }
    assert_abs_diff_eq!(x.at(0, 0), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(x.at(1, 0), 1.0, epsilon = 1e-6);
}

#[test]
fn well_conditioned_system_has_no_diagnostic() {
    let a = Dense::with_data(2, 2, vec![4.0, 1.0, 1.0, 3.0]);
    let b = Dense::with_data(2, 1, vec![1.0, 2.0]);
    let mut x = Dense::default();
    assert!(x.solve(&a, &b).is_ok());
}

#[test]
fn partial_overlap_panics_with_region_overlap() {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    let parent = Dense::new(4, 4);
    let mut c = parent.slice(0, 3, 0, 3);
    let a = parent.slice(1, 4, 1, 4);
    let b = Dense::new(3, 3);
    let got = catch_unwind(AssertUnwindSafe(|| c.add(&a, &b))).unwrap_err();
    assert_eq!(*got.downcast_ref::<String>().unwrap(), REGION_OVERLAP);
}

#[test]
fn exact_identity_region_updates_in_place() {
    let mut c = Dense::with_data(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
    let view = c.view();
    let b = Dense::with_data(2, 2, vec![0.5, 0.5, 0.5, 0.5]);
    c.add(&view, &b);
    assert_eq!(c.at(0, 0), 1.5);
    assert_eq!(c.at(1, 1), 4.5);
}

#[test]
fn pooled_and_fresh_paths_are_numerically_identical() {
    let mut rng = StdRng::seed_from_u64(5);
    let n = 8;
    let data: Vec<f64> = (0..n * n).map(|_| rng.r#gen::<f64>() - 0.5).collect();
    let a = Dense::with_data(n, n, data.clone());

    // Fresh path: product into an independent receiver.
    let mut fresh = Dense::default();
    fresh.mul(&a, &a);

    // Pooled path: an aliased receiver forces the scratch-workspace
    // route.
    let mut aliased = Dense::with_data(n, n, data);
    let view = aliased.view();
    aliased.mul(&view, &view);

    for i in 0..n {
        for j in 0..n {
            assert_eq!(
                fresh.at(i, j).to_bits(),
                aliased.at(i, j).to_bits(),
                "pooling must not change results at [{i}][{j}]"
            );
        }
    }
}

#[test]
fn vector_solve_dispatches_by_shape() {
    // Tall: least squares.
    let a = Dense::with_data(3, 2, vec![1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
    let b = Vector::with_data(vec![6.0, 5.0, 7.0]);
    let mut x = Vector::default();
    x.solve_vec(&a, &b).unwrap();
    assert_eq!(x.len(), 2);
    assert_abs_diff_eq!(x.at_vec(0), 5.0, epsilon = 1e-10);
    assert_abs_diff_eq!(x.at_vec(1), 0.5, epsilon = 1e-10);

    // Wide: minimum norm.
    let a = Dense::with_data(2, 3, vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
    let b = Vector::with_data(vec![2.0, 4.0]);
    let mut x = Vector::default();
    x.solve_vec(&a, &b).unwrap();
    assert_eq!(x.len(), 3);
    let mut ax = Dense::default();
    ax.mul(&a, &x);
    assert_abs_diff_eq!(ax.at(0, 0), 2.0, epsilon = 1e-10);
    assert_abs_diff_eq!(ax.at(1, 0), 4.0, epsilon = 1e-10);
}

#[test]
fn grow_preserves_contents_either_way() {
    let parent = Dense::with_data(3, 3, (1..=9).map(f64::from).collect());
    let small = parent.slice(0, 2, 0, 2);
    // Within capacity: shares the parent's buffer.
    let in_place = small.grow(1, 1);
    assert_eq!(in_place.at(0, 0), 1.0);
    assert_eq!(in_place.at(2, 2), 9.0);
    // Beyond capacity: reallocates and zero-fills the new area.
    let realloc = small.grow(2, 2);
    assert_eq!(realloc.dims(), (4, 4));
    assert_eq!(realloc.at(0, 1), 2.0);
    assert_eq!(realloc.at(3, 3), 0.0);
}
