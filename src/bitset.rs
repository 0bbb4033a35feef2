//! Compact bitset representation for taxon subsets.
//!
//! # Overview
//! Once a decomposition has fixed an ordering of the taxa, a set of taxa can be
//! written as a bitset where bit `i` marks the taxon at position `i`. Marking
//! every subset's taxa in one bitset and counting the set bits tells whether
//! the subsets cover the whole ordering.
//!
//! # Example
//! For taxa [t0, t1, t2, t3] mapped to indices [0, 1, 2, 3]:
//! - Subset {t0, t2} → bitset `0b0101` (bits 0 and 2 set)
//! - Subset {t1, t2, t3} → bitset `0b1110` (bits 1, 2, 3 set)

/// A compact bitset marking which taxa belong to a set.
///
/// Internally stores bits in `Vec<u64>` words, 64 taxon indices per word, so
/// datasets of any size are supported.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed. Calculate as `num_taxa.div_ceil(64)`
    ///
    /// # Example
    /// ```
    /// # use phylo_subsets::bitset::Bitset;
    /// // 100 taxa need 2 words (128 bits)
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Sets the bit at the given index to 1. Setting a bit twice is a no-op.
    ///
    /// # Example
    /// ```
    /// # use phylo_subsets::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // idx / 64
        let bit = idx & 63; // idx % 64
        self.0[word] |= 1u64 << bit;
    }

    /// Counts the number of set bits (how many distinct taxa were marked).
    ///
    /// # Example
    /// ```
    /// # use phylo_subsets::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
    }

    /// Two sibling windows over ten taxa sharing one boundary taxon
    ///
    /// ```text
    /// index:  0 1 2 3 4 5 6 7 8 9
    /// left:   x x x x x x
    /// right:            x x x x x
    /// ```
    #[test]
    fn test_overlapping_windows_cover_once() {
        let mut covered = Bitset::zeros(1);
        for idx in (0..6).chain(5..10) {
            covered.set(idx);
        }
        assert_eq!(covered.count_ones(), 10);
    }

    #[test]
    fn test_large_taxon_set() {
        // More than 64 taxa (multiple words)
        let mut bs = Bitset::zeros(2);
        bs.set(0); // first word
        bs.set(63); // last bit of first word
        bs.set(64); // first bit of second word
        bs.set(127); // last bit of second word

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.0[0], 1u64 | (1u64 << 63));
        assert_eq!(bs.0[1], 1u64 | (1u64 << 63));
    }

    #[test]
    fn test_empty() {
        let bs = Bitset::zeros(1);
        assert_eq!(bs.count_ones(), 0);
    }
}
