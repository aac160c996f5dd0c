use std::sync::Arc;

use fhe::bfv::{BfvParameters, BfvParametersBuilder};
use rand::{CryptoRng, Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::Error;
use crate::hashing::{BucketSlot, HASH_FUNCTIONS};
use crate::utils::smallest_batching_prime;

/// BFV ring degree, which is also the SIMD slot count.
pub const DEGREE: usize = 16384;

/// Coefficient modulus sizes in bits. Seven 60-bit primes stay under the
/// 438-bit limit for 128-bit security at this degree.
pub const MODULI_SIZES: [usize; 7] = [60, 60, 60, 60, 60, 60, 60];

/// The plain modulus must stay below every coefficient modulus prime.
const PLAIN_MODULUS_MAX_BITS: usize = 60;

/// Protocol parameters shared by both parties. Immutable once the seeds are
/// in place; every derived quantity is fixed at construction.
#[derive(Clone)]
pub struct PsiParams {
    pub receiver_size: usize,
    pub sender_size: usize,
    pub input_bits: usize,
    bucket_count_log: usize,
    sender_bucket_capacity: usize,
    plain_modulus: u64,
    seeds: Vec<u64>,
    bfv: Arc<BfvParameters>,
}

/// The out-of-band parameter announcement. Both parties must run from
/// identical announcements; there is no in-protocol negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsAnnouncement {
    pub receiver_size: usize,
    pub sender_size: usize,
    pub input_bits: usize,
    pub seeds: Vec<u64>,
    pub degree: usize,
    pub plain_modulus: u64,
    pub moduli_sizes: Vec<usize>,
}

impl PsiParams {
    /// Fixes all derived quantities and builds the BFV context.
    ///
    /// The plain modulus is the smallest batching-compatible prime that
    /// leaves room for every encoded bucket element, so narrow inputs get
    /// the cheapest plaintext space that still fits.
    pub fn new(receiver_size: usize, sender_size: usize, input_bits: usize) -> Result<Self, Error> {
        if receiver_size == 0 || sender_size == 0 {
            return Err(Error::InvalidParameters("set sizes must be nonzero".into()));
        }
        if input_bits == 0 || input_bits > 63 {
            return Err(Error::InvalidParameters(format!(
                "input_bits must be in 1..=63, got {}",
                input_bits
            )));
        }

        // a power of two between 2x and 4x the receiver's set size
        let mut bucket_count_log = 0;
        while (1usize << bucket_count_log) < receiver_size {
            bucket_count_log += 1;
        }
        bucket_count_log += 1;

        // An encoded element keeps input_bits - bucket_count_log value bits
        // plus two hash-index bits; dummies need values up to 7.
        let headroom = input_bits.saturating_sub(bucket_count_log) + 2;
        let min_plain = if headroom < 64 {
            (1u64 << headroom).max(8)
        } else {
            u64::MAX
        };
        let plain_modulus = smallest_batching_prime(DEGREE, min_plain, PLAIN_MODULUS_MAX_BITS)
            .ok_or(Error::PlainModulusNotFound {
                min_value: min_plain,
                max_bits: PLAIN_MODULUS_MAX_BITS,
            })?;

        let bfv = Arc::new(
            BfvParametersBuilder::new()
                .set_degree(DEGREE)
                .set_plaintext_modulus(plain_modulus)
                .set_moduli_sizes(&MODULI_SIZES)
                .build()?,
        );

        Ok(PsiParams {
            receiver_size,
            sender_size,
            input_bits,
            bucket_count_log,
            sender_bucket_capacity: sender_bucket_capacity(
                sender_size,
                1usize << bucket_count_log,
            ),
            plain_modulus,
            seeds: vec![],
            bfv,
        })
    }

    /// Draws one fresh uniform seed per hash function.
    pub fn generate_seeds<R: RngCore + CryptoRng>(&mut self, rng: &mut R) {
        self.seeds = (0..HASH_FUNCTIONS).map(|_| rng.random()).collect();
    }

    /// Adopts seeds announced by the other party.
    pub fn set_seeds(&mut self, seeds: &[u64]) -> Result<(), Error> {
        if seeds.len() != HASH_FUNCTIONS {
            return Err(Error::WrongSeedCount {
                expected: HASH_FUNCTIONS,
                found: seeds.len(),
            });
        }
        self.seeds = seeds.to_vec();
        Ok(())
    }

    pub fn seeds(&self) -> &[u64] {
        &self.seeds
    }

    pub fn hash_functions(&self) -> usize {
        HASH_FUNCTIONS
    }

    pub fn bucket_count_log(&self) -> usize {
        self.bucket_count_log
    }

    pub fn bucket_count(&self) -> usize {
        1usize << self.bucket_count_log
    }

    pub fn sender_bucket_capacity(&self) -> usize {
        self.sender_bucket_capacity
    }

    pub fn plain_modulus(&self) -> u64 {
        self.plain_modulus
    }

    /// SIMD lanes per plaintext.
    pub fn slot_count(&self) -> usize {
        self.bfv.degree()
    }

    /// Ciphertexts per protocol message.
    pub fn ciphertext_count(&self) -> usize {
        codec::block_count(self.bucket_count(), self.slot_count())
    }

    pub fn bfv_params(&self) -> &Arc<BfvParameters> {
        &self.bfv
    }

    /// The single on-wire numeric encoding of a bucket slot, used as the
    /// polynomial indeterminate (receiver) and as polynomial roots (sender).
    ///
    /// The low `bucket_count_log` bits of the value are dropped: the bucket
    /// index already carries them. Dummies use the reserved hash index 3,
    /// with distinct values per side so they never match each other.
    pub fn encode_bucket_element(&self, slot: Option<BucketSlot>, is_receiver: bool) -> u64 {
        let encoded = match slot {
            Some(s) => {
                debug_assert!((s.hash_index as usize) < HASH_FUNCTIONS);
                ((s.value >> self.bucket_count_log) << 2) | s.hash_index as u64
            }
            None => 3 | ((is_receiver as u64) << 2),
        };
        debug_assert!(encoded < self.plain_modulus);
        encoded
    }

    pub fn announce(&self) -> ParamsAnnouncement {
        ParamsAnnouncement {
            receiver_size: self.receiver_size,
            sender_size: self.sender_size,
            input_bits: self.input_bits,
            seeds: self.seeds.clone(),
            degree: DEGREE,
            plain_modulus: self.plain_modulus,
            moduli_sizes: MODULI_SIZES.to_vec(),
        }
    }

    /// Rebuilds the announcing party's parameters, rejecting announcements
    /// whose FHE block disagrees with what these sizes derive to.
    pub fn from_announcement(ann: &ParamsAnnouncement) -> Result<Self, Error> {
        let mut par = PsiParams::new(ann.receiver_size, ann.sender_size, ann.input_bits)?;
        if ann.degree != DEGREE
            || ann.plain_modulus != par.plain_modulus
            || ann.moduli_sizes != MODULI_SIZES
        {
            return Err(Error::InvalidParameters(
                "announced FHE parameters disagree with the derived ones".into(),
            ));
        }
        par.set_seeds(&ann.seeds)?;
        Ok(par)
    }
}

/// Smallest per-bucket capacity keeping the probability that complete
/// hashing overflows any bucket at or below 2^-40, by union bound over the
/// buckets on the binomial tail. Capped at the total number of placements,
/// where overflow is impossible.
fn sender_bucket_capacity(sender_size: usize, bucket_count: usize) -> usize {
    let balls = HASH_FUNCTIONS * sender_size;
    let target = -40.0 * std::f64::consts::LN_2;
    let ln_b = (bucket_count as f64).ln();

    let mut ln_choose = 0.0;
    for c in 1..balls {
        ln_choose += ((balls - c + 1) as f64).ln() - (c as f64).ln();
        if ln_b + ln_choose - c as f64 * ln_b <= target {
            return c;
        }
    }
    balls
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn derived_quantities() {
        let par = PsiParams::new(4, 8, 16).unwrap();
        assert_eq!(par.bucket_count_log(), 3);
        assert_eq!(par.bucket_count(), 8);
        assert!(par.bucket_count() >= 2 * par.receiver_size);
        assert_eq!(par.plain_modulus(), 65537);
        assert_eq!(par.slot_count(), DEGREE);
        assert_eq!(par.ciphertext_count(), 1);
        assert_eq!(par.sender_bucket_capacity(), 20);
    }

    #[test]
    fn capacity_never_exceeds_placements() {
        assert_eq!(sender_bucket_capacity(1, 2), 3);
        assert_eq!(sender_bucket_capacity(5, 8), 15);
        assert_eq!(sender_bucket_capacity(4, 8), 12);
    }

    #[test]
    fn plain_modulus_scales_with_input_width() {
        let par = PsiParams::new(4, 8, 40).unwrap();
        let t = par.plain_modulus();
        assert!(t >= 1u64 << 39);
        assert_eq!(t % (2 * DEGREE as u64), 1);
        assert!(crate::utils::is_prime(t));
    }

    #[test]
    fn unsatisfiable_parameters_rejected() {
        assert!(matches!(
            PsiParams::new(4, 8, 63),
            Err(Error::PlainModulusNotFound { .. })
        ));
        assert!(matches!(
            PsiParams::new(0, 8, 16),
            Err(Error::InvalidParameters(_))
        ));
        assert!(matches!(
            PsiParams::new(4, 8, 0),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn seed_management() {
        let mut par = PsiParams::new(4, 8, 16).unwrap();
        assert!(par.seeds().is_empty());

        par.generate_seeds(&mut thread_rng());
        assert_eq!(par.seeds().len(), 3);

        assert!(matches!(
            par.set_seeds(&[1, 2]),
            Err(Error::WrongSeedCount { expected: 3, found: 2 })
        ));
        par.set_seeds(&[1, 2, 3]).unwrap();
        assert_eq!(par.seeds(), &[1, 2, 3]);
    }

    #[test]
    fn bucket_element_encoding() {
        let par = PsiParams::new(4, 8, 16).unwrap();
        // value 0b1010_1100 in bucket_count_log = 3: high bits 0b10101
        let slot = BucketSlot {
            value: 0b1010_1100,
            hash_index: 2,
        };
        assert_eq!(par.encode_bucket_element(Some(slot), true), (0b10101 << 2) | 2);
        assert_eq!(par.encode_bucket_element(Some(slot), false), (0b10101 << 2) | 2);
        // dummies differ per side
        assert_eq!(par.encode_bucket_element(None, false), 3);
        assert_eq!(par.encode_bucket_element(None, true), 7);
    }

    #[test]
    fn announcement_roundtrip() {
        let mut par = PsiParams::new(4, 8, 16).unwrap();
        par.generate_seeds(&mut thread_rng());

        let ann = par.announce();
        let par2 = PsiParams::from_announcement(&ann).unwrap();
        assert_eq!(par2.seeds(), par.seeds());
        assert_eq!(par2.plain_modulus(), par.plain_modulus());
        assert_eq!(par2.bucket_count(), par.bucket_count());
        assert_eq!(par2.sender_bucket_capacity(), par.sender_bucket_capacity());
        assert_eq!(par2.announce(), ann);
    }
}
