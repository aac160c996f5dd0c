use std::sync::Arc;

use fhe::bfv::{Ciphertext, PublicKey, RelinearizationKey};
use fhe_math::zq::Modulus;
use fhe_traits::FheEncrypter;
use rand::{CryptoRng, RngCore};

use crate::codec;
use crate::error::Error;
use crate::hashing::complete_hash;
use crate::params::PsiParams;
use crate::poly::polynomial_from_roots;
use crate::utils::random_nonzero_vec;

/// Hook for inspecting intermediate ciphertexts while the sender works,
/// e.g. to watch the noise budget drain. Passed in explicitly; the core
/// never holds the receiver's secret key.
pub trait NoiseObserver {
    fn observe(&mut self, stage: &str, ct: &Ciphertext);
}

/// The party with the large set. Stateless beyond the shared parameters:
/// each round hashes, builds polynomials, and evaluates them fresh.
pub struct PsiSender {
    par: Arc<PsiParams>,
}

impl PsiSender {
    pub fn new(par: &Arc<PsiParams>) -> PsiSender {
        PsiSender { par: par.clone() }
    }

    /// Evaluates, for every receiver bucket, the polynomial whose roots are
    /// the sender's encoded bucket elements, at the receiver's encrypted
    /// value, then masks each slot with a fresh uniform nonzero factor.
    ///
    /// A slot decrypts to 0 exactly when the receiver's element is in the
    /// sender's bucket; every other slot decrypts to a uniform nonzero
    /// field element.
    pub fn compute_matches<R: RngCore + CryptoRng>(
        &self,
        inputs: &[u64],
        receiver_public_key: &PublicKey,
        relin_keys: &RelinearizationKey,
        receiver_inputs: &[Ciphertext],
        mut observer: Option<&mut dyn NoiseObserver>,
        rng: &mut R,
    ) -> Result<Vec<Ciphertext>, Error> {
        let par = &self.par;
        if inputs.len() != par.sender_size {
            return Err(Error::WrongInputCount {
                expected: par.sender_size,
                found: inputs.len(),
            });
        }
        for &v in inputs {
            if par.input_bits < 64 && v >> par.input_bits != 0 {
                return Err(Error::InputTooWide {
                    value: v,
                    input_bits: par.input_bits,
                });
            }
        }
        if receiver_inputs.len() != par.ciphertext_count() {
            return Err(Error::WrongCiphertextCount {
                expected: par.ciphertext_count(),
                found: receiver_inputs.len(),
            });
        }

        let capacity = par.sender_bucket_capacity();
        let buckets = complete_hash(inputs, par.bucket_count_log(), capacity, par.seeds())?;

        // per-bucket coefficients of f(x) = prod_{y in bucket} (x - y)
        let q = Modulus::new(par.plain_modulus())?;
        let mut this_bucket = vec![0u64; capacity];
        let f_coeffs: Vec<Vec<u64>> = (0..par.bucket_count())
            .map(|b| {
                for (j, root) in this_bucket.iter_mut().enumerate() {
                    *root = par.encode_bucket_element(buckets[b * capacity + j], false);
                }
                polynomial_from_roots(&this_bucket, &q)
            })
            .collect();

        let bfv = par.bfv_params();
        let ranges = codec::block_ranges(par.bucket_count(), par.slot_count());
        let mut result = Vec::with_capacity(receiver_inputs.len());

        for (receiver_ct, range) in receiver_inputs.iter().zip(ranges) {
            // regroup coefficients by degree: row j holds the degree-j
            // coefficient of every polynomial batched into this ciphertext
            let mut rows = vec![vec![0u64; range.len()]; capacity + 1];
            for (k, b) in range.enumerate() {
                for (j, row) in rows.iter_mut().enumerate() {
                    row[k] = f_coeffs[b][j];
                }
            }

            // constant terms start the accumulator so each power's term can
            // be added on top
            let pt = codec::encode_slots(&rows[0], bfv)?;
            let mut acc: Ciphertext = receiver_public_key.try_encrypt(&pt, rng)?;
            if let Some(obs) = observer.as_deref_mut() {
                obs.observe("constant term", &acc);
            }

            // powers[j] = receiver value to the j-th power; even powers by
            // squaring halve the multiplicative depth
            let mut powers = vec![Ciphertext::zero(bfv); capacity + 1];
            powers[1] = receiver_ct.clone();
            for j in 2..=capacity {
                let mut p = if j & 1 == 0 {
                    &powers[j / 2] * &powers[j / 2]
                } else {
                    &powers[j - 1] * &powers[1]
                };
                relin_keys.relinearizes(&mut p)?;
                powers[j] = p;
            }

            for (j, row) in rows.iter().enumerate().skip(1) {
                // an all-zero coefficient row contributes nothing
                if row.iter().all(|&c| c == 0) {
                    continue;
                }
                let pt = codec::encode_slots(row, bfv)?;
                let term = &powers[j] * &pt;
                acc += &term;
                if let Some(obs) = observer.as_deref_mut() {
                    obs.observe("accumulated term", &acc);
                }
            }

            // a uniform nonzero factor per slot turns every non-vanishing
            // evaluation into a uniform nonzero field element
            let mask = random_nonzero_vec(par.slot_count(), par.plain_modulus(), rng);
            let mask_pt = codec::encode_slots(&mask, bfv)?;
            acc = &acc * &mask_pt;
            if let Some(obs) = observer.as_deref_mut() {
                obs.observe("masked", &acc);
            }

            result.push(acc);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::PsiReceiver;
    use fhe_traits::FheDecrypter;
    use rand::thread_rng;

    const SEEDS: [u64; 3] = [0x243f6a8885a308d3, 0x13198a2e03707344, 0xa4093822299f31d0];

    fn test_params(receiver_size: usize, sender_size: usize) -> Arc<PsiParams> {
        let mut par = PsiParams::new(receiver_size, sender_size, 16).unwrap();
        par.set_seeds(&SEEDS).unwrap();
        Arc::new(par)
    }

    #[test]
    fn rejects_wrong_sizes() {
        let mut rng = thread_rng();
        let par = test_params(4, 4);
        let receiver = PsiReceiver::new(&par, &mut rng);
        let relin = receiver.relin_keys(&mut rng).unwrap();
        let sender = PsiSender::new(&par);

        assert!(matches!(
            sender.compute_matches(
                &[1, 2, 3],
                receiver.public_key(),
                &relin,
                &[],
                None,
                &mut rng
            ),
            Err(Error::WrongInputCount { expected: 4, found: 3 })
        ));
        assert!(matches!(
            sender.compute_matches(
                &[1, 2, 3, 4],
                receiver.public_key(),
                &relin,
                &[],
                None,
                &mut rng
            ),
            Err(Error::WrongCiphertextCount { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn match_slots_are_zero_and_the_rest_uniform_nonzero() {
        let mut rng = thread_rng();
        let par = test_params(4, 4);
        let receiver = PsiReceiver::new(&par, &mut rng);
        let relin = receiver.relin_keys(&mut rng).unwrap();
        let sender = PsiSender::new(&par);

        let mut receiver_inputs = vec![1u64, 2, 3, 4];
        let cts = receiver
            .encrypt_inputs(&mut receiver_inputs, &mut rng)
            .unwrap();
        let reply = sender
            .compute_matches(
                &[2, 4, 6, 8],
                receiver.public_key(),
                &relin,
                &cts,
                None,
                &mut rng,
            )
            .unwrap();
        assert_eq!(reply.len(), cts.len());

        let pt = receiver.sk.try_decrypt(&reply[0]).unwrap();
        let values = crate::codec::decode_slots(&pt).unwrap();
        let t = par.plain_modulus();

        let mut matched = vec![];
        for (bucket, &v) in values.iter().take(par.bucket_count()).enumerate() {
            assert!(v < t);
            if v == 0 {
                matched.push(receiver_inputs[bucket]);
            }
        }
        matched.sort_unstable();
        assert_eq!(matched, vec![2, 4]);
    }

    #[test]
    fn observer_sees_every_stage() {
        struct Counter {
            stages: Vec<String>,
        }
        impl NoiseObserver for Counter {
            fn observe(&mut self, stage: &str, _ct: &Ciphertext) {
                self.stages.push(stage.to_string());
            }
        }

        let mut rng = thread_rng();
        let par = test_params(1, 1);
        let receiver = PsiReceiver::new(&par, &mut rng);
        let relin = receiver.relin_keys(&mut rng).unwrap();
        let sender = PsiSender::new(&par);

        let mut inputs = vec![7u64];
        let cts = receiver.encrypt_inputs(&mut inputs, &mut rng).unwrap();

        let mut counter = Counter { stages: vec![] };
        sender
            .compute_matches(
                &[7],
                receiver.public_key(),
                &relin,
                &cts,
                Some(&mut counter),
                &mut rng,
            )
            .unwrap();

        assert_eq!(counter.stages.first().map(String::as_str), Some("constant term"));
        assert_eq!(counter.stages.last().map(String::as_str), Some("masked"));
    }
}
