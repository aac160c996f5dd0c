use rand::{distr::Uniform, prelude::Distribution, CryptoRng, RngCore};

fn mul_mod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

fn pow_mod(mut base: u64, mut exp: u64, m: u64) -> u64 {
    let mut acc = 1u64;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = mul_mod(acc, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    acc
}

/// Deterministic Miller-Rabin for u64 (the first twelve primes as witnesses
/// cover the full 64-bit range).
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }

    let mut d = n - 1;
    let mut s = 0u32;
    while d & 1 == 0 {
        d >>= 1;
        s += 1;
    }

    'witness: for a in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime `p ≡ 1 (mod 2 * degree)` with `p >= min_value`, which is
/// what BFV batching requires of the plain modulus. `None` if no such prime
/// fits in `max_bits` bits.
pub fn smallest_batching_prime(degree: usize, min_value: u64, max_bits: usize) -> Option<u64> {
    let step = 2 * degree as u128;
    let cap = 1u128 << max_bits;
    let mut k = (min_value.saturating_sub(1) as u128 + step - 1) / step;
    if k == 0 {
        k = 1;
    }
    loop {
        let p = step * k + 1;
        if p >= cap {
            return None;
        }
        if is_prime(p as u64) {
            return Some(p as u64);
        }
        k += 1;
    }
}

/// `len` independent uniform samples from `[1, modulus)`.
pub fn random_nonzero_vec<R: RngCore + CryptoRng>(len: usize, modulus: u64, rng: &mut R) -> Vec<u64> {
    Uniform::new(1u64, modulus)
        .unwrap()
        .sample_iter(rng)
        .take(len)
        .collect()
}
