use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::marker::PhantomData;

use log::debug;

use crate::error::FilterError;
use crate::hash::Murmur3BuildHasher;
use crate::quotient_filter::{low_mask, Iter, Position, QuotientFilter};

/// Fingerprint width used unless a constructor overrides it.
pub const DEFAULT_FINGERPRINT_BITS: u32 = u64::BITS;

const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.75;
const MIN_MAX_LOAD_FACTOR: f64 = 0.01;

/// Approximate-membership set over keys of type `K`.
///
/// Keys are hashed to `fp_bits`-wide fingerprints and handed to an embedded
/// [`QuotientFilter`]; the keys themselves are never stored. Lookups can
/// therefore report false positives (two keys sharing a truncated hash), but
/// never false negatives. With the full 64-bit fingerprint width the set is
/// exact for keys whose hashes are unique.
///
/// The set grows by re-tiling: when an insert would push `len` past
/// `capacity` (= `max_load_factor · slot_count`), a fresh engine with twice
/// the slots and one fewer remainder bit is built and every stored
/// fingerprint replayed into it. Growth stops when a single remainder bit is
/// left; inserting past that point fails with
/// [`FilterError::CapacityExceeded`].
///
/// The default hasher is deterministic (murmur3 with a fixed seed), so two
/// sets built from the same keys compare equal regardless of insertion
/// order, slot count or load-factor policy.
pub struct QuotientSet<K, S = Murmur3BuildHasher> {
    filter: QuotientFilter,
    hash_builder: S,
    fp_bits: u32,
    max_load_factor: f64,
    _keys: PhantomData<fn(&K)>,
}

impl<K: Hash> QuotientSet<K> {
    /// Creates an empty set with the default hasher and a 64-bit fingerprint.
    ///
    /// The engine starts with zero capacity; the first insert sizes it.
    pub fn new() -> Self {
        Self::with_hasher(Murmur3BuildHasher::default())
    }

    /// Creates an empty set with at least `slot_hint` slots (rounded up to a
    /// power of two).
    pub fn with_slots(slot_hint: usize) -> Result<Self, FilterError> {
        Self::with_options(slot_hint, DEFAULT_FINGERPRINT_BITS, Murmur3BuildHasher::default())
    }

    /// Creates an empty set whose fingerprints are truncated to `fp_bits`
    /// bits. Narrow widths trade memory for false-positive rate and bound
    /// the set's growth at `2^(fp_bits - 1)` slots.
    pub fn with_fingerprint_bits(fp_bits: u32) -> Result<Self, FilterError> {
        Self::with_options(0, fp_bits, Murmur3BuildHasher::default())
    }

    /// Builds a set from a sequence of keys, with at least `slot_hint` slots.
    pub fn from_keys<I>(keys: I, slot_hint: usize) -> Result<Self, FilterError>
    where
        I: IntoIterator,
        I::Item: Borrow<K>,
    {
        let mut set = Self::with_slots(slot_hint)?;
        set.insert_all(keys)?;
        Ok(set)
    }
}

impl<K: Hash, S: BuildHasher> QuotientSet<K, S> {
    /// Creates an empty set with an explicit hasher and a 64-bit fingerprint.
    pub fn with_hasher(hash_builder: S) -> Self {
        QuotientSet {
            filter: QuotientFilter::default(),
            hash_builder,
            fp_bits: DEFAULT_FINGERPRINT_BITS,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            _keys: PhantomData,
        }
    }

    /// Creates an empty set with at least `slot_hint` slots, `fp_bits`-wide
    /// fingerprints and an explicit hasher.
    pub fn with_options(slot_hint: usize, fp_bits: u32, hash_builder: S) -> Result<Self, FilterError> {
        if fp_bits == 0 || fp_bits > u64::BITS {
            return Err(FilterError::InvalidGeometry);
        }
        let mut set = QuotientSet {
            filter: QuotientFilter::default(),
            hash_builder,
            fp_bits,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            _keys: PhantomData,
        };
        if slot_hint > 0 {
            set.regenerate(slot_hint)?;
        }
        Ok(set)
    }

    /// Number of keys in the set.
    pub fn len(&self) -> usize {
        self.filter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
    }

    /// Number of physical slots; always zero or a power of two.
    pub fn slot_count(&self) -> usize {
        self.filter.capacity()
    }

    /// Largest `len` accepted before the next insert re-tiles the engine.
    pub fn capacity(&self) -> usize {
        self.capacity_for(self.slot_count())
    }

    /// Upper bound on the set's size: the widest geometry keeps one
    /// remainder bit, so at most `2^(fp_bits - 1)` slots exist.
    pub fn max_size(&self) -> usize {
        1usize << (self.fp_bits - 1)
    }

    pub fn fingerprint_bits(&self) -> u32 {
        self.fp_bits
    }

    /// Current fill ratio, `len / slot_count`; 0.0 for a set whose engine
    /// has not been sized yet.
    pub fn load_factor(&self) -> f64 {
        if self.slot_count() == 0 {
            return 0.0;
        }
        self.len() as f64 / self.slot_count() as f64
    }

    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Iterates the stored fingerprints (not keys) in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        self.filter.iter()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.filter.contains(self.fingerprint(key))
    }

    /// How many times `key` is stored: 0 or 1.
    pub fn count(&self, key: &K) -> usize {
        self.contains(key) as usize
    }

    /// Position of `key`'s fingerprint, if present. The position is
    /// invalidated by any mutation, including re-tiling.
    pub fn find(&self, key: &K) -> Option<Position> {
        self.filter.find(self.fingerprint(key))
    }

    /// Inserts `key`, growing the engine if the load bound is crossed.
    ///
    /// Returns whether the fingerprint was newly inserted; `Ok(false)` means
    /// the key (or a key colliding with it) was already present. Fails with
    /// [`FilterError::CapacityExceeded`] once growth would leave no
    /// remainder bits.
    pub fn insert(&mut self, key: &K) -> Result<bool, FilterError> {
        let fp = self.fingerprint(key);
        if self.len() >= self.capacity() {
            // A full set should not grow just to rediscover a duplicate.
            if self.filter.contains(fp) {
                return Ok(false);
            }
            let slots = self.slots_for(self.len() + 1);
            self.rebuild(slots)?;
        }
        Ok(self.filter.insert(fp)?.1)
    }

    /// Inserts every key of a sequence.
    pub fn insert_all<I>(&mut self, keys: I) -> Result<(), FilterError>
    where
        I: IntoIterator,
        I::Item: Borrow<K>,
    {
        for key in keys {
            self.insert(key.borrow())?;
        }
        Ok(())
    }

    /// Erases `key` if present; returns the number of keys removed (0 or 1).
    pub fn erase(&mut self, key: &K) -> usize {
        let fp = self.fingerprint(key);
        self.filter.erase(fp)
    }

    /// Erases the entry at a position previously returned by [`find`].
    ///
    /// [`find`]: QuotientSet::find
    pub fn erase_at(&mut self, entry: Position) {
        self.filter.erase_at(entry);
    }

    /// Removes every key; geometry is retained.
    pub fn clear(&mut self) {
        self.filter.clear();
    }

    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(self, other);
    }

    /// Sets the load bound, clamped into `[0.01, 1.0]`. Lowering it below
    /// the current fill re-tiles immediately.
    pub fn set_max_load_factor(&mut self, ml: f64) -> Result<(), FilterError> {
        self.max_load_factor = ml.clamp(MIN_MAX_LOAD_FACTOR, 1.0);
        if self.len() > self.capacity() {
            let slots = self.slots_for(self.len());
            self.rebuild(slots)?;
        }
        Ok(())
    }

    /// Ensures capacity for at least `n` keys. Grows only; use
    /// [`regenerate`] to shrink.
    ///
    /// [`regenerate`]: QuotientSet::regenerate
    pub fn reserve(&mut self, n: usize) -> Result<(), FilterError> {
        let slots = self.slots_for(n.max(self.len()));
        if slots > self.slot_count() {
            self.rebuild(slots)?;
        }
        Ok(())
    }

    /// Re-tiles to `max(slot_hint, minimum geometry holding len)` slots.
    /// `regenerate(0)` shrinks to the smallest geometry that fits.
    pub fn regenerate(&mut self, slot_hint: usize) -> Result<(), FilterError> {
        let slots = self
            .slots_for(self.len())
            .max(slot_hint.next_power_of_two().max(1));
        self.rebuild(slots)
    }

    fn fingerprint(&self, key: &K) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish() & low_mask(self.fp_bits)
    }

    fn capacity_for(&self, slots: usize) -> usize {
        ((self.max_load_factor * slots as f64) as usize).min(slots)
    }

    // Smallest power-of-two slot count whose capacity admits `n` keys.
    fn slots_for(&self, n: usize) -> usize {
        let mut slots = n.max(1).next_power_of_two();
        while self.capacity_for(slots) < n {
            slots *= 2;
        }
        slots
    }

    // Replaces the engine with a fresh `slots`-slot one, replaying every
    // stored fingerprint. `slots` must be a power of two.
    fn rebuild(&mut self, slots: usize) -> Result<(), FilterError> {
        let q_bits = slots.trailing_zeros();
        if q_bits >= self.fp_bits {
            return Err(FilterError::CapacityExceeded);
        }
        let r_bits = self.fp_bits - q_bits;
        let mut fresh = QuotientFilter::new(q_bits, r_bits)?;
        for fp in self.filter.iter() {
            fresh.insert(fp)?;
        }
        debug!(
            "retiled quotient set: slots {} -> {} (q={}, r={}, len={})",
            self.slot_count(),
            slots,
            q_bits,
            r_bits,
            fresh.len()
        );
        self.filter = fresh;
        Ok(())
    }
}

// Manual impl: cloning never needs `K: Clone`, keys are not stored.
impl<K, S: Clone> Clone for QuotientSet<K, S> {
    fn clone(&self) -> Self {
        QuotientSet {
            filter: self.filter.clone(),
            hash_builder: self.hash_builder.clone(),
            fp_bits: self.fp_bits,
            max_load_factor: self.max_load_factor,
            _keys: PhantomData,
        }
    }
}

impl<K, S> fmt::Debug for QuotientSet<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotientSet")
            .field("len", &self.filter.len())
            .field("slot_count", &self.filter.capacity())
            .field("fp_bits", &self.fp_bits)
            .field("max_load_factor", &self.max_load_factor)
            .finish_non_exhaustive()
    }
}

impl<K: Hash, S: BuildHasher + Default> Default for QuotientSet<K, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

/// Two sets are equal iff their fingerprint sequences are equal element-wise.
/// Hasher identity, load-factor policy and slot count do not participate.
impl<K: Hash, S: BuildHasher> PartialEq for QuotientSet<K, S> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Hash, S: BuildHasher> Eq for QuotientSet<K, S> {}

impl<'a, K: Hash, S: BuildHasher> IntoIterator for &'a QuotientSet<K, S> {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
