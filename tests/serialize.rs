//! Serialization round trips through the public API, including a full
//! compute-persist-reload cycle.

use densolve::{Dense, Error, Matrix, Vector};

#[test]
fn finite_values_round_trip_bit_for_bit() {
    let a = Dense::with_data(3, 2, vec![0.1, -0.2, 1e300, -1e-300, 42.5, 0.0]);
    let bytes = a.marshal_binary().unwrap();
    let mut back = Dense::default();
    back.unmarshal_binary(&bytes).unwrap();
    for i in 0..3 {
        for j in 0..2 {
            assert_eq!(a.at(i, j).to_bits(), back.at(i, j).to_bits());
        }
    }
}

#[test]
fn special_values_survive() {
    let v = Vector::with_data(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0]);
    let bytes = v.marshal_binary().unwrap();
    let mut back = Vector::default();
    back.unmarshal_binary(&bytes).unwrap();
    assert!(back.at_vec(0).is_nan());
    assert_eq!(back.at_vec(1), f64::INFINITY);
    assert_eq!(back.at_vec(2), f64::NEG_INFINITY);
    assert_eq!(back.at_vec(3).to_bits(), (-0.0f64).to_bits());
}

#[test]
fn solve_persist_reload_solve_again() {
    let a = Dense::with_data(2, 2, vec![4.0, 1.0, 1.0, 3.0]);
    let b = Vector::with_data(vec![1.0, 2.0]);
    let mut x = Vector::default();
    x.solve_vec(&a, &b).unwrap();

    // Persist the coefficient matrix and the solution, reload both, and
    // confirm the reloaded pair still satisfies the system.
    let a_bytes = a.marshal_binary().unwrap();
    let x_bytes = x.marshal_binary().unwrap();
    let mut a2 = Dense::default();
    a2.unmarshal_binary(&a_bytes).unwrap();
    let mut x2 = Vector::default();
    x2.unmarshal_binary(&x_bytes).unwrap();

    let mut ax = Dense::default();
    ax.mul(&a2, &x2);
    assert!((ax.at(0, 0) - 1.0).abs() < 1e-14);
    assert!((ax.at(1, 0) - 2.0).abs() < 1e-14);
}

#[test]
fn malformed_streams_are_returned_errors_not_panics() {
    let mut m = Dense::default();
    assert_eq!(m.unmarshal_binary(&[1, 2, 3]), Err(Error::TooSmall));

    let mut bytes = vec![0u8; 24];
    bytes[..8].copy_from_slice(&1i64.to_le_bytes());
    bytes[8..16].copy_from_slice(&2i64.to_le_bytes());
    // Header promises 2 elements but only 1 follows.
    let mut m = Dense::default();
    assert_eq!(m.unmarshal_binary(&bytes), Err(Error::BadBuffer));

    let mut v = Vector::default();
    let mut vbytes = vec![0u8; 8];
    vbytes.copy_from_slice(&(-5i64).to_le_bytes());
    assert_eq!(v.unmarshal_binary(&vbytes), Err(Error::BadSize));
}

#[test]
fn strided_view_serializes_its_logical_contents() {
    let parent = Dense::with_data(4, 4, (0..16).map(f64::from).collect());
    let view = parent.slice(1, 3, 1, 3);
    let bytes = view.marshal_binary().unwrap();
    let mut back = Dense::default();
    back.unmarshal_binary(&bytes).unwrap();
    assert_eq!(back.dims(), (2, 2));
    assert_eq!(back.at(0, 0), 5.0);
    assert_eq!(back.at(1, 1), 10.0);
}
