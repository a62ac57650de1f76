/// The modulus of [`hashcode`].
pub const BIG_PRIME: u32 = 1_560_007;

/// Computes the hash code of a key.
///
/// This is a rolling polynomial hash over the key's bytes in base 256, reduced
/// modulo [`BIG_PRIME`] after every byte. It is deterministic and makes no
/// claim of collision resistance.
pub fn hashcode(key: &str) -> u32 {
    let hash = key.bytes().fold(0_u64, |hash, byte| {
        (hash * 256 + u64::from(byte)) % u64::from(BIG_PRIME)
    });

    hash as u32
}
