use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitAnd, BitOr};

const WORD_BITS: usize = 64;

/// A set of star column bit positions.
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// Trailing zero words are never kept, so keys compare and hash by the bits they contain,
/// independent of the column count they were sized for. Most stars have fewer than 128
/// columns, which keeps the words inline.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitKey {
    words: SmallVec<[u64; 2]>,
}

impl BitKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty key with room for `bits` positions (typically the star's column count).
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            words: SmallVec::with_capacity(bits.div_ceil(WORD_BITS)),
        }
    }

    pub fn from_positions(positions: impl IntoIterator<Item = usize>) -> Self {
        let mut key = Self::new();
        for pos in positions {
            key.set(pos);
        }
        key
    }

    pub fn set(&mut self, pos: usize) {
        let word = pos / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (pos % WORD_BITS);
    }

    pub fn clear(&mut self, pos: usize) {
        let word = pos / WORD_BITS;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (pos % WORD_BITS));
            self.trim();
        }
    }

    pub fn get(&self, pos: usize) -> bool {
        self.words
            .get(pos / WORD_BITS)
            .is_some_and(|w| (w >> (pos % WORD_BITS)) & 1 == 1)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn union(&self, other: &BitKey) -> BitKey {
        let mut out = self.clone();
        out.or_inplace(other);
        out
    }

    pub fn intersection(&self, other: &BitKey) -> BitKey {
        let mut out = self.clone();
        out.and_inplace(other);
        out
    }

    /// Bits set in `self` but not in `other`.
    pub fn and_not(&self, other: &BitKey) -> BitKey {
        let mut out = self.clone();
        for (w, o) in out.words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
        out.trim();
        out
    }

    pub fn or_inplace(&mut self, other: &BitKey) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
    }

    pub fn and_inplace(&mut self, other: &BitKey) {
        self.words.truncate(other.words.len());
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= o;
        }
        self.trim();
    }

    pub fn is_superset_of(&self, other: &BitKey) -> bool {
        if other.words.len() > self.words.len() {
            return false;
        }
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(w, o)| w & o == *o)
    }

    pub fn intersects(&self, other: &BitKey) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(w, o)| w & o != 0)
    }

    /// Lowest set position at or after `from`.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word_idx = from / WORD_BITS;
        let first = self.words.get(word_idx)?;
        let mut word = first & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                return Some(word_idx * WORD_BITS + word.trailing_zeros() as usize);
            }
            word_idx += 1;
            word = *self.words.get(word_idx)?;
        }
    }

    /// Set positions in ascending order.
    pub fn iter(&self) -> BitKeyIter<'_> {
        BitKeyIter {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

pub struct BitKeyIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for BitKeyIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * WORD_BITS + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

impl<'a> IntoIterator for &'a BitKey {
    type Item = usize;
    type IntoIter = BitKeyIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<usize> for BitKey {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self::from_positions(iter)
    }
}

impl BitOr for &BitKey {
    type Output = BitKey;

    fn bitor(self, rhs: &BitKey) -> BitKey {
        self.union(rhs)
    }
}

impl BitAnd for &BitKey {
    type Output = BitKey;

    fn bitand(self, rhs: &BitKey) -> BitKey {
        self.intersection(rhs)
    }
}

/// Orders keys as unsigned integers (the highest differing bit decides).
impl Ord for BitKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.words.len().cmp(&other.words.len()).then_with(|| {
            for (a, b) in self.words.iter().rev().zip(other.words.iter().rev()) {
                let ord = a.cmp(b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        })
    }
}

impl PartialOrd for BitKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, pos) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{pos}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for BitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitKey{self}")
    }
}
