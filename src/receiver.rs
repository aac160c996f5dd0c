use std::sync::Arc;

use fhe::bfv::{Ciphertext, PublicKey, RelinearizationKey, SecretKey};
use fhe_traits::{FheDecrypter, FheEncrypter};
use rand::{CryptoRng, RngCore};

use crate::codec;
use crate::error::Error;
use crate::hashing::cuckoo_hash;
use crate::params::PsiParams;

/// The party with the small set. Holds the only secret key of the protocol
/// and learns the intersection; the sender sees nothing but ciphertexts.
pub struct PsiReceiver {
    par: Arc<PsiParams>,
    pub(crate) sk: SecretKey,
    pk: PublicKey,
}

impl PsiReceiver {
    /// Generates a fresh BFV keypair under the shared parameters.
    pub fn new<R: RngCore + CryptoRng>(par: &Arc<PsiParams>, rng: &mut R) -> PsiReceiver {
        let sk = SecretKey::random(par.bfv_params(), rng);
        let pk = PublicKey::new(&sk, rng);
        PsiReceiver {
            par: par.clone(),
            sk,
            pk,
        }
    }

    /// Public key for the sender's encryptions of polynomial constant terms.
    pub fn public_key(&self) -> &PublicKey {
        &self.pk
    }

    /// The receiver's own secret key. Never part of the protocol messages;
    /// exposed so hosts can measure noise budgets in local experiments.
    pub fn secret_key(&self) -> &SecretKey {
        &self.sk
    }

    /// Relinearization keys for the sender's ciphertext multiplications.
    pub fn relin_keys<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
    ) -> Result<RelinearizationKey, Error> {
        Ok(RelinearizationKey::new(&self.sk, rng)?)
    }

    /// Cuckoo-hashes `inputs` and encrypts the encoded bucket vector into
    /// `ceil(bucket_count / slot_count)` ciphertexts.
    ///
    /// On success `inputs` is rewritten in place to length `bucket_count`,
    /// holding in position `i` the original value that landed in bucket `i`
    /// (0 for empty buckets); `decrypt_matches` indices point into this
    /// rearranged vector.
    pub fn encrypt_inputs<R: RngCore + CryptoRng>(
        &self,
        inputs: &mut Vec<u64>,
        rng: &mut R,
    ) -> Result<Vec<Ciphertext>, Error> {
        if inputs.len() != self.par.receiver_size {
            return Err(Error::WrongInputCount {
                expected: self.par.receiver_size,
                found: inputs.len(),
            });
        }
        for &v in inputs.iter() {
            if self.par.input_bits < 64 && v >> self.par.input_bits != 0 {
                return Err(Error::InputTooWide {
                    value: v,
                    input_bits: self.par.input_bits,
                });
            }
        }

        let buckets = cuckoo_hash(inputs, self.par.bucket_count_log(), self.par.seeds())?;

        let mut result = Vec::with_capacity(self.par.ciphertext_count());
        for range in codec::block_ranges(self.par.bucket_count(), self.par.slot_count()) {
            let values: Vec<u64> = buckets[range]
                .iter()
                .map(|&slot| self.par.encode_bucket_element(slot, true))
                .collect();
            let pt = codec::encode_slots(&values, self.par.bfv_params())?;
            result.push(self.pk.try_encrypt(&pt, rng)?);
        }

        // Matches come back as hash-table locations, so rearrange the input
        // vector to mirror the table: the caller maps indices to values.
        *inputs = buckets
            .iter()
            .map(|slot| slot.map_or(0, |s| s.value))
            .collect();

        Ok(result)
    }

    /// Decrypts the sender's reply and returns every bucket index whose slot
    /// is zero, in increasing order. A zero slot means the bucket's
    /// polynomial vanished at the receiver's value; masked non-matches are
    /// uniform nonzero field elements.
    pub fn decrypt_matches(&self, encrypted_matches: &[Ciphertext]) -> Result<Vec<usize>, Error> {
        let expected = self.par.ciphertext_count();
        if encrypted_matches.len() != expected {
            return Err(Error::WrongCiphertextCount {
                expected,
                found: encrypted_matches.len(),
            });
        }

        let slot_count = self.par.slot_count();
        let bucket_count = self.par.bucket_count();
        let mut result = vec![];

        for (i, ct) in encrypted_matches.iter().enumerate() {
            let pt = self.sk.try_decrypt(ct)?;
            let values = codec::decode_slots(&pt)?;
            for (j, &v) in values.iter().enumerate() {
                let bucket = slot_count * i + j;
                if bucket >= bucket_count {
                    break;
                }
                if v == 0 {
                    result.push(bucket);
                }
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    const SEEDS: [u64; 3] = [0x243f6a8885a308d3, 0x13198a2e03707344, 0xa4093822299f31d0];

    fn test_params() -> Arc<PsiParams> {
        let mut par = PsiParams::new(4, 8, 16).unwrap();
        par.set_seeds(&SEEDS).unwrap();
        Arc::new(par)
    }

    #[test]
    fn rejects_wrong_input_count() {
        let mut rng = thread_rng();
        let par = test_params();
        let receiver = PsiReceiver::new(&par, &mut rng);

        let mut inputs = vec![1u64, 2, 3];
        assert!(matches!(
            receiver.encrypt_inputs(&mut inputs, &mut rng),
            Err(Error::WrongInputCount { expected: 4, found: 3 })
        ));
        // failed calls leave the inputs untouched
        assert_eq!(inputs, vec![1, 2, 3]);
    }

    #[test]
    fn rejects_overwide_input() {
        let mut rng = thread_rng();
        let par = test_params();
        let receiver = PsiReceiver::new(&par, &mut rng);

        let mut inputs = vec![1u64, 2, 3, 1 << 16];
        assert!(matches!(
            receiver.encrypt_inputs(&mut inputs, &mut rng),
            Err(Error::InputTooWide { .. })
        ));
    }

    #[test]
    fn rearranges_inputs_to_bucket_order() {
        let mut rng = thread_rng();
        let par = test_params();
        let receiver = PsiReceiver::new(&par, &mut rng);

        let original = vec![5u64, 17, 23, 99];
        let mut inputs = original.clone();
        let cts = receiver.encrypt_inputs(&mut inputs, &mut rng).unwrap();

        assert_eq!(cts.len(), par.ciphertext_count());
        assert_eq!(inputs.len(), par.bucket_count());
        // every original input is somewhere in the rearranged vector, and
        // nothing else is (empty buckets read 0)
        for &v in &original {
            assert_eq!(inputs.iter().filter(|&&x| x == v).count(), 1);
        }
        assert_eq!(
            inputs.iter().filter(|&&x| x == 0).count(),
            par.bucket_count() - original.len()
        );
    }

    #[test]
    fn rejects_wrong_ciphertext_count() {
        let mut rng = thread_rng();
        let par = test_params();
        let receiver = PsiReceiver::new(&par, &mut rng);
        assert!(matches!(
            receiver.decrypt_matches(&[]),
            Err(Error::WrongCiphertextCount { expected: 1, found: 0 })
        ));
    }
}
