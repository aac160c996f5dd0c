use fhe_math::zq::Modulus;

/// Coefficients of `f(x) = prod_i (x - roots[i])` over `Z/q`, in ascending
/// degree order. The result has length `roots.len() + 1` and its leading
/// coefficient is 1.
pub fn polynomial_from_roots(roots: &[u64], q: &Modulus) -> Vec<u64> {
    let mut coeffs = Vec::with_capacity(roots.len() + 1);
    coeffs.push(1u64);

    for &root in roots {
        let r = q.reduce(root);
        // multiply the accumulated polynomial by (x - r)
        coeffs.push(0);
        for i in (1..coeffs.len()).rev() {
            coeffs[i] = q.sub(coeffs[i - 1], q.mul(r, coeffs[i]));
        }
        coeffs[0] = q.sub(0, q.mul(r, coeffs[0]));
    }

    coeffs
}

/// Horner evaluation of ascending-order `coeffs` at `x` over `Z/q`.
pub fn evaluate(coeffs: &[u64], x: u64, q: &Modulus) -> u64 {
    let x = q.reduce(x);
    let mut acc = 0u64;
    for &c in coeffs.iter().rev() {
        acc = q.add(q.mul(acc, x), q.reduce(c));
    }
    acc
}
