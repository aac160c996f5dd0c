use std::ops::Range;
use std::sync::Arc;

use fhe::bfv::{BfvParameters, Encoding, Plaintext};
use fhe_traits::{FheDecoder, FheEncoder};

use crate::error::Error;

/// Ranges of bucket indices carried by each ciphertext, in index order.
///
/// Every block holds `slot_count` buckets except possibly the final one.
/// When `bucket_count` is an exact multiple of `slot_count` the final block
/// is a full one, not an empty one.
pub fn block_ranges(bucket_count: usize, slot_count: usize) -> Vec<Range<usize>> {
    let blocks = bucket_count.div_ceil(slot_count);
    (0..blocks)
        .map(|i| slot_count * i..usize::min(slot_count * (i + 1), bucket_count))
        .collect()
}

/// Number of ciphertexts needed for `bucket_count` buckets.
pub fn block_count(bucket_count: usize, slot_count: usize) -> usize {
    bucket_count.div_ceil(slot_count)
}

/// Batch-encode up to `slot_count` values into one SIMD plaintext. Unused
/// slots take the encoder's default fill.
pub fn encode_slots(values: &[u64], par: &Arc<BfvParameters>) -> Result<Plaintext, Error> {
    debug_assert!(values.len() <= par.degree());
    Ok(Plaintext::try_encode(values, Encoding::simd(), par)?)
}

/// Batch-decode a SIMD plaintext back into its `slot_count` field elements.
pub fn decode_slots(pt: &Plaintext) -> Result<Vec<u64>, Error> {
    Ok(Vec::<u64>::try_decode(pt, Encoding::simd())?)
}
