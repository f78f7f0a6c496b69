//! Supported key type bitmap
//!
//! The delivery provider stores the set of supported VAA key types as a
//! `uint256` where bit `k` is set when key type `k` is supported. Key types
//! are `u8`, so every representable key fits the 256-bit word.

use alloy::primitives::U256;

/// Build a bitmap with bit `1 << k` set for every key
pub fn generate_bitmap<I>(keys: I) -> U256
where
    I: IntoIterator<Item = u8>,
{
    keys.into_iter()
        .fold(U256::ZERO, |acc, key| acc | (U256::from(1u8) << usize::from(key)))
}

/// Return the set bit positions of a bitmap, ascending
pub fn extract_keys(bitmap: U256) -> Vec<u8> {
    (0..=u8::MAX)
        .filter(|&key| bitmap.bit(usize::from(key)))
        .collect()
}
