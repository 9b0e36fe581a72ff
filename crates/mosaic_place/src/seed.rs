//! Deterministic per-job seed derivation.
//!
//! Every randomized stage (clustering, each cluster anneal, each deblock
//! box) derives its own seed from the base seed and a stage/job salt, so
//! parallel jobs never alias RNG streams and runs reproduce exactly.

/// Derives a job seed from the base seed and a salt.
///
/// Uses a splitmix64 finalizer over the combined value; the mapping is
/// deterministic and well-spread even for small consecutive salts.
pub fn derive_seed(base: u64, salt: u64) -> u64 {
    let mut z = base ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
