use crate::error::Error;

/// Number of hash functions shared by both parties. Index 3 is reserved to
/// tag dummy (empty) slots on the wire.
pub const HASH_FUNCTIONS: usize = 3;

/// An occupied cell of a hash table: the stored value and the index of the
/// hash function that placed it there. Empty cells are `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketSlot {
    pub value: u64,
    pub hash_index: u8,
}

/// Keyed 64-bit mixer (splitmix64 finalizer over the seeded value). Both
/// parties compute it identically from the shared seed alone.
fn mix(seed: u64, x: u64) -> u64 {
    let mut z = x ^ seed;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Bucket index of `value` under hash function `hash_index`.
///
/// Permutation-based: the low `bucket_count_log` bits of the value are XORed
/// with a mix of the high bits, so the bucket index together with the high
/// bits determines the value exactly. This is what lets the wire encoding
/// drop the low bits.
pub fn bucket_of(value: u64, hash_index: usize, bucket_count_log: usize, seeds: &[u64]) -> usize {
    debug_assert!(hash_index < HASH_FUNCTIONS);
    let mask = (1u64 << bucket_count_log) - 1;
    let low = value & mask;
    let high = value >> bucket_count_log;
    ((low ^ mix(seeds[hash_index], high)) & mask) as usize
}

/// Cuckoo-hash `inputs` into `2^bucket_count_log` buckets of one slot each.
///
/// Standard eviction: insert under the current hash index, kick out any
/// occupant and re-insert it under its next index. Chains are bounded by
/// `8 * ceil(log2(n))`; exceeding the bound returns `Error::CuckooFull`, at
/// which point the caller re-seeds and retries the round.
pub fn cuckoo_hash(
    inputs: &[u64],
    bucket_count_log: usize,
    seeds: &[u64],
) -> Result<Vec<Option<BucketSlot>>, Error> {
    if seeds.len() != HASH_FUNCTIONS {
        return Err(Error::WrongSeedCount {
            expected: HASH_FUNCTIONS,
            found: seeds.len(),
        });
    }

    let bucket_count = 1usize << bucket_count_log;
    let mut buckets: Vec<Option<BucketSlot>> = vec![None; bucket_count];
    let max_iters = 8 * (usize::BITS - inputs.len().leading_zeros()).max(1) as usize;

    for &input in inputs {
        let mut item = BucketSlot {
            value: input,
            hash_index: 0,
        };
        let mut placed = false;
        for _ in 0..max_iters {
            let b = bucket_of(item.value, item.hash_index as usize, bucket_count_log, seeds);
            match buckets[b].replace(item) {
                None => {
                    placed = true;
                    break;
                }
                Some(evicted) => {
                    // Keep iterating with the evicted occupant under its
                    // next candidate index.
                    item = evicted;
                    item.hash_index = (item.hash_index + 1) % HASH_FUNCTIONS as u8;
                }
            }
        }
        if !placed {
            return Err(Error::CuckooFull);
        }
    }

    Ok(buckets)
}

/// Hash every input into all three of its candidate buckets, tagged with the
/// hash index used. The table is a flat arena of `bucket_count * capacity`
/// slots addressed by `bucket * capacity + slot`; a bucket with no free slot
/// left returns `Error::BucketOverflow`.
pub fn complete_hash(
    inputs: &[u64],
    bucket_count_log: usize,
    capacity: usize,
    seeds: &[u64],
) -> Result<Vec<Option<BucketSlot>>, Error> {
    if seeds.len() != HASH_FUNCTIONS {
        return Err(Error::WrongSeedCount {
            expected: HASH_FUNCTIONS,
            found: seeds.len(),
        });
    }

    let bucket_count = 1usize << bucket_count_log;
    let mut buckets: Vec<Option<BucketSlot>> = vec![None; bucket_count * capacity];

    for &input in inputs {
        for h in 0..HASH_FUNCTIONS {
            let b = bucket_of(input, h, bucket_count_log, seeds);
            let slots = &mut buckets[b * capacity..(b + 1) * capacity];
            let free = slots
                .iter_mut()
                .find(|s| s.is_none())
                .ok_or(Error::BucketOverflow(b))?;
            *free = Some(BucketSlot {
                value: input,
                hash_index: h as u8,
            });
        }
    }

    Ok(buckets)
}
