use densolve::{Cholesky, Dense, Matrix, SymDense, Vector};
use rand::Rng;

fn main() {
    // Fit y = a + b*x to noisy samples of y = 2 + 0.5x via the
    // shape-dispatched solver (tall system -> least squares).
    let mut rng = rand::thread_rng();
    let n = 20;
    let mut design = Dense::new(n, 2);
    let mut rhs = Vector::new(n);
    for i in 0..n {
        let x = i as f64 / 2.0;
        design.set(i, 0, 1.0);
        design.set(i, 1, x);
        let noise: f64 = rng.r#gen::<f64>() * 0.1 - 0.05;
        rhs.set_vec(i, 2.0 + 0.5 * x + noise);
    }
    let mut coef = Vector::default();
    match coef.solve_vec(&design, &rhs) {
        Ok(()) => println!("fit: intercept = {:.4}, slope = {:.4}", coef.at_vec(0), coef.at_vec(1)),
        Err(err) => println!("fit flagged: {err}"),
    }

    // Solve the normal equations once via Cholesky and reuse the
    // factorization for several right-hand sides.
    let mut gram = SymDense::default();
    gram.sym_outer_k(1.0, &design.t());
    let mut chol = Cholesky::default();
    assert!(chol.factorize(&gram), "normal equations are positive definite");
    println!("normal-equation condition estimate: {:.2e}", chol.cond());

    for scale in [1.0, 2.0, -0.5] {
        let mut atb = Dense::default();
        let mut scaled = Vector::default();
        scaled.scale_vec(scale, &rhs);
        atb.mul(&design.t(), &scaled.as_dense());
        let mut x = Dense::default();
        chol.solve_to(&mut x, &atb).unwrap();
        println!("scale {scale:+.1}: intercept = {:.4}, slope = {:.4}", x.at(0, 0), x.at(1, 0));
    }

    // Persist the design matrix and load it back.
    let bytes = design.marshal_binary().unwrap();
    let mut reloaded = Dense::default();
    reloaded.unmarshal_binary(&bytes).unwrap();
    println!("round-tripped {} bytes, dims {:?}", bytes.len(), reloaded.dims());
}
