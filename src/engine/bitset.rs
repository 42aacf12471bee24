//! Fixed-width bitset backing component and tag sets.
//!
//! Every set-valued concept in the engine — which component types an
//! archetype stores, which tags an entity carries, which constraints a
//! query filter imposes — is a [`Bitset`]: a fixed array of `u64` words
//! covering [`TYPE_CAP`](crate::engine::types::TYPE_CAP) type indices.
//!
//! The representation is a plain value type: copyable, comparable word by
//! word, and hashable, so a `(Bitset, Bitset)` pair can key the store's
//! archetype map directly. Set membership is always expressed through
//! type indices assigned by the
//! [`TypeRegistry`](crate::engine::registry::TypeRegistry), never through
//! `TypeId` hashing in hot paths.

use std::fmt;

use crate::engine::types::TYPE_CAP;

/// Number of `u64` words in a [`Bitset`].
pub const BITSET_WORDS: usize = TYPE_CAP / 64;

const _: [(); 1] = [(); (TYPE_CAP % 64 == 0) as usize];

/// Fixed 256-bit set of type indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bitset {
    words: [u64; BITSET_WORDS],
}

impl Bitset {
    /// Creates an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self { words: [0u64; BITSET_WORDS] }
    }

    /// Sets the bit at `index`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < TYPE_CAP);
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clears the bit at `index`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < TYPE_CAP);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the bit at `index` is set.
    #[inline]
    pub fn has(&self, index: usize) -> bool {
        debug_assert!(index < TYPE_CAP);
        (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// Returns `true` if every bit set in `other` is also set in `self`.
    #[inline]
    pub fn has_all(&self, other: &Bitset) -> bool {
        for (word, other_word) in self.words.iter().zip(other.words.iter()) {
            if (word & other_word) != *other_word {
                return false;
            }
        }
        true
    }

    /// Returns `true` if at least one bit is set in both `self` and `other`.
    #[inline]
    pub fn has_any(&self, other: &Bitset) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(word, other_word)| (word & other_word) != 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Merges every bit of `other` into `self`.
    #[inline]
    pub fn union_with(&mut self, other: &Bitset) {
        for (word, other_word) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= other_word;
        }
    }

    /// Iterates over all set bit indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(base + tz)
                })
            })
    }
}

impl fmt::Debug for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.indices()).finish()
    }
}
