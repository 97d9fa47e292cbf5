use std::fmt;

use bitvec::prelude::BitVec;

use crate::error::FilterError;

const BITS_PER_BLOCK: u32 = u64::BITS;

/// Mask selecting the low `num_bits` bits of a word.
pub(crate) const fn low_mask(num_bits: u32) -> u64 {
    if num_bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << num_bits) - 1
    }
}

/// Handle to a stored fingerprint, as returned by [`QuotientFilter::find`]
/// and [`QuotientFilter::insert`].
///
/// A position is only meaningful against the filter that produced it, and
/// only until that filter's next mutation. Positions from different filters
/// never compare meaningfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    pub(crate) pos: usize,
    pub(crate) quotient: u64,
}

/// Quotient filter over already-hashed fingerprints.
///
/// A fingerprint of width `q + r` bits is split into a quotient (high `q`
/// bits, the canonical slot index) and a remainder (low `r` bits, the value
/// physically stored). Slots carry three metadata flags (`occupied`,
/// `continuation` and `shifted`) that keep colliding remainders grouped into
/// sorted runs, so membership, deletion and ascending-order iteration all
/// work without storing the keys.
///
/// The filter never grows. Inserting into a full filter fails with
/// [`FilterError::Full`]; resizing policy lives in
/// [`QuotientSet`](crate::quotient_set::QuotientSet).
#[derive(Clone, Default)]
pub struct QuotientFilter {
    q_bits: u32,
    r_bits: u32,
    num_slots: usize,
    len: usize,
    q_mask: u64,
    r_mask: u64,
    is_occupied: BitVec,
    is_continuation: BitVec,
    is_shifted: BitVec,
    // Remainders, r_bits per slot, packed little-endian into u64 blocks.
    // One spare trailing block so a straddling field can always read the
    // next block.
    data: Vec<u64>,
}

impl QuotientFilter {
    /// Creates an empty filter with `2^q_bits` slots of `r_bits`-wide
    /// remainders.
    ///
    /// Fails with [`FilterError::InvalidGeometry`] if `r_bits` is zero or
    /// the fingerprint width `q_bits + r_bits` exceeds 64.
    pub fn new(q_bits: u32, r_bits: u32) -> Result<Self, FilterError> {
        if r_bits == 0 || q_bits + r_bits > u64::BITS {
            return Err(FilterError::InvalidGeometry);
        }
        let num_slots = 1usize << q_bits;
        let required_bits = num_slots * r_bits as usize;
        let num_blocks = required_bits.div_ceil(BITS_PER_BLOCK as usize) + 1;
        Ok(QuotientFilter {
            q_bits,
            r_bits,
            num_slots,
            len: 0,
            q_mask: low_mask(q_bits),
            r_mask: low_mask(r_bits),
            is_occupied: BitVec::repeat(false, num_slots),
            is_continuation: BitVec::repeat(false, num_slots),
            is_shifted: BitVec::repeat(false, num_slots),
            data: vec![0; num_blocks],
        })
    }

    pub fn quotient_bits(&self) -> u32 {
        self.q_bits
    }

    pub fn remainder_bits(&self) -> u32 {
        self.r_bits
    }

    /// Number of stored fingerprints.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The slot count; the filter holds at most one fingerprint per slot.
    pub fn capacity(&self) -> usize {
        self.num_slots
    }

    pub fn is_full(&self) -> bool {
        self.len == self.num_slots
    }

    /// Removes every fingerprint. Geometry and storage are retained.
    pub fn clear(&mut self) {
        self.is_occupied.fill(false);
        self.is_continuation.fill(false);
        self.is_shifted.fill(false);
        self.len = 0;
    }

    /// Reconstructs the fingerprint stored at `entry`.
    pub fn fingerprint_at(&self, entry: Position) -> u64 {
        // r_bits may be 64 (q = 0); the quotient is 0 then.
        let high = entry.quotient.checked_shl(self.r_bits).unwrap_or(0);
        high | self.get_remainder(entry.pos)
    }

    /// Looks up `fp`, returning the position of the slot holding it.
    pub fn find(&self, fp: u64) -> Option<Position> {
        if self.is_empty() {
            return None;
        }
        let quotient = self.extract_quotient(fp);
        let remainder = self.extract_remainder(fp);
        let canonical = quotient as usize;

        // No run for this quotient: fp cannot exist.
        if !self.is_occupied[canonical] {
            return None;
        }

        // Scan the sorted run.
        let mut pos = self.find_run_start(quotient);
        loop {
            let stored = self.get_remainder(pos);
            if stored == remainder {
                return Some(Position { pos, quotient });
            }
            if stored > remainder {
                return None;
            }
            pos = self.incr_pos(pos);
            if !self.is_continuation[pos] {
                return None;
            }
        }
    }

    pub fn contains(&self, fp: u64) -> bool {
        self.find(fp).is_some()
    }

    /// Inserts `fp`, keeping its run sorted.
    ///
    /// Returns the position of the fingerprint and whether the insertion took
    /// place (`false` if it was already present). When the filter is full, a
    /// duplicate still reports `Ok((pos, false))`; an absent fingerprint
    /// fails with [`FilterError::Full`] and the filter is unchanged.
    ///
    /// A successful insertion invalidates all previously obtained positions.
    pub fn insert(&mut self, fp: u64) -> Result<(Position, bool), FilterError> {
        if self.is_full() {
            return match self.find(fp) {
                Some(entry) => Ok((entry, false)),
                None => Err(FilterError::Full),
            };
        }

        let quotient = self.extract_quotient(fp);
        let remainder = self.extract_remainder(fp);
        let canonical = quotient as usize;

        if self.is_empty_slot(canonical) {
            self.is_occupied.set(canonical, true);
            self.set_remainder(canonical, remainder);
            self.len += 1;
            return Ok((
                Position {
                    pos: canonical,
                    quotient,
                },
                true,
            ));
        }

        // The canonical slot is taken, but the quotient itself may still have
        // no run.
        let run_was_empty = !self.is_occupied[canonical];
        if run_was_empty {
            self.is_occupied.set(canonical, true);
        }

        let mut pos = self.find_run_start(quotient);
        let run_start = pos;

        if !run_was_empty {
            // Walk the run in ascending remainder order.
            loop {
                let stored = self.get_remainder(pos);
                if stored == remainder {
                    return Ok((Position { pos, quotient }, false));
                }
                if stored > remainder {
                    break;
                }
                pos = self.incr_pos(pos);
                if !self.is_continuation[pos] {
                    break;
                }
            }
            if pos == run_start {
                // The old head is about to be displaced by a smaller
                // remainder and becomes a continuation.
                self.is_continuation.set(pos, true);
            }
        }

        self.shift_insert(pos, remainder, pos != run_start);
        if pos == canonical {
            self.is_shifted.set(pos, false);
        }
        self.len += 1;
        Ok((Position { pos, quotient }, true))
    }

    /// Erases `fp` if present; returns the number of fingerprints removed
    /// (0 or 1). Removal invalidates all previously obtained positions.
    pub fn erase(&mut self, fp: u64) -> usize {
        match self.find(fp) {
            Some(entry) => {
                self.erase_at(entry);
                1
            }
            None => 0,
        }
    }

    /// Erases the fingerprint at `entry`.
    ///
    /// `entry` must come from `find` or `insert` on this filter with no
    /// mutation in between.
    pub fn erase_at(&mut self, entry: Position) {
        self.remove_entry(entry.pos, entry.quotient as usize);
        self.len -= 1;
    }

    /// Iterates the stored fingerprints in strictly ascending order.
    pub fn iter(&self) -> Iter<'_> {
        if self.is_empty() {
            return Iter {
                filter: self,
                state: None,
                remaining: 0,
            };
        }
        let mut quotient_pos = 0;
        while !self.is_occupied[quotient_pos] {
            quotient_pos += 1;
        }
        let pos = self.find_run_start(quotient_pos as u64);
        Iter {
            filter: self,
            state: Some((pos, quotient_pos as u64)),
            remaining: self.len,
        }
    }

    fn extract_quotient(&self, fp: u64) -> u64 {
        fp.checked_shr(self.r_bits).unwrap_or(0) & self.q_mask
    }

    fn extract_remainder(&self, fp: u64) -> u64 {
        fp & self.r_mask
    }

    fn incr_pos(&self, pos: usize) -> usize {
        (pos + 1) & (self.num_slots - 1)
    }

    fn decr_pos(&self, pos: usize) -> usize {
        pos.wrapping_sub(1) & (self.num_slots - 1)
    }

    fn is_empty_slot(&self, pos: usize) -> bool {
        !self.is_occupied[pos] && !self.is_continuation[pos] && !self.is_shifted[pos]
    }

    fn is_run_start(&self, pos: usize) -> bool {
        !self.is_continuation[pos] && (self.is_occupied[pos] || self.is_shifted[pos])
    }

    fn get_remainder(&self, pos: usize) -> u64 {
        let first_bit = self.r_bits as usize * pos;
        let block = first_bit / BITS_PER_BLOCK as usize;
        let offset = (first_bit % BITS_PER_BLOCK as usize) as u32;

        let bits_read = (BITS_PER_BLOCK - offset).min(self.r_bits);
        let mut value = (self.data[block] >> offset) & low_mask(bits_read);
        let pending = self.r_bits - bits_read;
        if pending > 0 {
            value |= (self.data[block + 1] & low_mask(pending)) << bits_read;
        }
        value
    }

    // Requires: value fits in r_bits.
    fn set_remainder(&mut self, pos: usize, value: u64) {
        debug_assert_eq!(value, value & self.r_mask);
        let first_bit = self.r_bits as usize * pos;
        let block = first_bit / BITS_PER_BLOCK as usize;
        let offset = (first_bit % BITS_PER_BLOCK as usize) as u32;

        let bits_written = (BITS_PER_BLOCK - offset).min(self.r_bits);
        self.data[block] &= !(low_mask(bits_written) << offset);
        self.data[block] |= value << offset;

        let pending = self.r_bits - bits_written;
        if pending > 0 {
            self.data[block + 1] &= !low_mask(pending);
            self.data[block + 1] |= value >> bits_written;
        }
    }

    fn exchange_remainder(&mut self, pos: usize, value: u64) -> u64 {
        let old = self.get_remainder(pos);
        self.set_remainder(pos, value);
        old
    }

    // Next occupied canonical slot after `pos`, wrapping. At least one
    // further occupied slot must exist.
    fn find_next_occupied(&self, pos: usize) -> usize {
        let mut pos = self.incr_pos(pos);
        while !self.is_occupied[pos] {
            pos = self.incr_pos(pos);
        }
        pos
    }

    // First slot of the run following the one starting at `run_pos`.
    fn find_next_run(&self, run_pos: usize) -> usize {
        debug_assert!(self.is_run_start(run_pos));
        let mut pos = self.incr_pos(run_pos);
        while self.is_continuation[pos] {
            pos = self.incr_pos(pos);
        }
        pos
    }

    // First slot of the run whose canonical slot is `quotient`. The run must
    // exist (`is_occupied[quotient]`).
    fn find_run_start(&self, quotient: u64) -> usize {
        let mut pos = quotient as usize;
        debug_assert!(self.is_occupied[pos]);

        if !self.is_shifted[pos] {
            return pos;
        }

        // Walk left to the cluster head, counting the runs in between.
        let mut runs_to_skip = 0;
        loop {
            pos = self.decr_pos(pos);
            if self.is_occupied[pos] {
                runs_to_skip += 1;
            }
            if !self.is_shifted[pos] {
                break;
            }
        }

        for _ in 0..runs_to_skip {
            pos = self.find_next_run(pos);
        }
        pos
    }

    // Writes (remainder, continuation) into `pos`, pushing everything up to
    // the first empty slot one step right. Every touched slot is marked
    // shifted; the caller corrects the flag when the inserted element lands
    // in its canonical slot.
    fn shift_insert(&mut self, mut pos: usize, mut remainder: u64, mut continuation: bool) {
        loop {
            let was_empty = self.is_empty_slot(pos);
            continuation = self.is_continuation.replace(pos, continuation);
            remainder = self.exchange_remainder(pos, remainder);
            self.is_shifted.set(pos, true);
            pos = self.incr_pos(pos);
            if was_empty {
                break;
            }
        }
    }

    // Removes the element at `remove_pos` (canonical slot `canonical`) by
    // compacting the rest of the cluster one step left.
    fn remove_entry(&mut self, remove_pos: usize, canonical: usize) {
        debug_assert!(!self.is_empty_slot(remove_pos));
        debug_assert!(self.is_occupied[canonical]);

        let was_head = !self.is_continuation[remove_pos];

        let mut current = remove_pos;
        // Canonical slot of the element being placed into `current`.
        let mut quotient_pos = canonical;

        loop {
            let next = self.incr_pos(current);
            if !self.is_shifted[next] {
                break;
            }

            let moved = self.get_remainder(next);
            self.set_remainder(current, moved);
            let continuation = self.is_continuation[next];
            self.is_continuation.set(current, continuation);

            if !continuation {
                // A run head moved into `current`; it may now sit in its
                // canonical slot.
                quotient_pos = self.find_next_occupied(quotient_pos);
                if quotient_pos == current {
                    self.is_shifted.set(current, false);
                }
            }
            current = next;
        }

        // `current` is the last slot of the cluster; it becomes empty. The
        // occupied flag belongs to the canonical slot, not the physical one,
        // so it is left alone.
        self.is_shifted.set(current, false);
        self.is_continuation.set(current, false);

        if was_head {
            if self.is_continuation[remove_pos] {
                // The next element takes over as head of the same run.
                self.is_continuation.set(remove_pos, false);
            } else {
                // The run is gone.
                self.is_occupied.set(canonical, false);
            }
        }
    }

    // Iterator step: next (pos, quotient) after the current one, or None at
    // the end of the table.
    fn advance(&self, pos: usize, quotient: u64) -> Option<(usize, u64)> {
        let mut pos = self.incr_pos(pos);
        if self.is_continuation[pos] {
            return Some((pos, quotient));
        }

        // Scan forward (not wrapping) for the next quotient that owns a run.
        let mut quotient_pos = quotient as usize;
        loop {
            quotient_pos += 1;
            if quotient_pos == self.num_slots {
                return None;
            }
            if self.is_occupied[quotient_pos] {
                break;
            }
        }

        while !self.is_run_start(pos) {
            pos = self.incr_pos(pos);
        }
        Some((pos, quotient_pos as u64))
    }
}

impl fmt::Debug for QuotientFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotientFilter")
            .field("q_bits", &self.q_bits)
            .field("r_bits", &self.r_bits)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Forward iterator over the stored fingerprints, in ascending order.
pub struct Iter<'a> {
    filter: &'a QuotientFilter,
    state: Option<(usize, u64)>,
    remaining: usize,
}

impl Iterator for Iter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let (pos, quotient) = self.state?;
        let value = self.filter.fingerprint_at(Position { pos, quotient });
        self.state = self.filter.advance(pos, quotient);
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl std::iter::FusedIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a QuotientFilter {
    type Item = u64;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::error::FilterError;

    // Flag well-formedness, size accounting and sorted unique iteration.
    fn assert_invariants(filter: &QuotientFilter) {
        let mut non_empty = 0;
        for pos in 0..filter.num_slots {
            let continuation = filter.is_continuation[pos];
            let shifted = filter.is_shifted[pos];
            assert!(
                !(continuation && !shifted),
                "continuation without shift at slot {pos}"
            );
            if !filter.is_empty_slot(pos) {
                non_empty += 1;
            }
        }
        assert_eq!(non_empty, filter.len(), "slot count out of sync with len");

        let collected: Vec<u64> = filter.iter().collect();
        assert_eq!(collected.len(), filter.len());
        assert!(
            collected.windows(2).all(|w| w[0] < w[1]),
            "iteration must be strictly ascending"
        );
    }

    #[test]
    fn split_extracts_quotient_and_remainder() {
        let qf = QuotientFilter::new(8, 4).unwrap();
        assert_eq!(qf.extract_quotient(0b1111_1111_0000), 0b1111_1111);
        assert_eq!(qf.extract_remainder(0b1111_1111_0000), 0b0000);
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert!(matches!(
            QuotientFilter::new(4, 0),
            Err(FilterError::InvalidGeometry)
        ));
        assert!(matches!(
            QuotientFilter::new(40, 40),
            Err(FilterError::InvalidGeometry)
        ));
        assert!(QuotientFilter::new(0, 64).is_ok());
        assert!(QuotientFilter::new(10, 54).is_ok());
    }

    #[test]
    fn default_filter_is_empty_and_full() {
        let mut qf = QuotientFilter::default();
        assert!(qf.is_empty());
        assert!(qf.is_full());
        assert_eq!(qf.capacity(), 0);
        assert_eq!(qf.insert(7), Err(FilterError::Full));
        assert_eq!(qf.find(7), None);
        assert_eq!(qf.erase(7), 0);
        assert_eq!(qf.iter().count(), 0);
    }

    #[test]
    fn insert_into_empty_slot() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        let (entry, inserted) = qf.insert(0b0001_0001).unwrap();
        assert!(inserted);
        assert_eq!(qf.len(), 1);
        assert_eq!(entry.pos, 1);

        assert!(qf.is_occupied[1]);
        assert!(!qf.is_continuation[1]);
        assert!(!qf.is_shifted[1]);
        assert_eq!(qf.get_remainder(1), 0b0001);
    }

    #[test]
    fn run_stays_sorted_by_remainder() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0010).unwrap();
        qf.insert(0b0001_0011).unwrap();
        // Lands between nothing and 0b0010: becomes the new run head.
        qf.insert(0b0001_0001).unwrap();

        assert_eq!(qf.len(), 3);
        assert_eq!(qf.get_remainder(1), 0b0001);
        assert_eq!(qf.get_remainder(2), 0b0010);
        assert_eq!(qf.get_remainder(3), 0b0011);
        assert!(!qf.is_continuation[1]);
        assert!(qf.is_continuation[2]);
        assert!(qf.is_continuation[3]);
        assert!(!qf.is_shifted[1]);
        assert!(qf.is_shifted[2]);
        assert!(qf.is_shifted[3]);
        assert_invariants(&qf);
    }

    #[test]
    fn cluster_keeps_runs_contiguous_and_in_quotient_order() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0001).unwrap();
        qf.insert(0b0010_0010).unwrap();
        qf.insert(0b0001_0011).unwrap();

        // q=1's run occupies slots 1..=2; q=2's element is pushed to slot 3.
        assert!(qf.is_occupied[1]);
        assert_eq!(qf.get_remainder(1), 0b0001);
        assert!(!qf.is_shifted[1]);

        assert!(qf.is_occupied[2]);
        assert_eq!(qf.get_remainder(2), 0b0011);
        assert!(qf.is_continuation[2]);
        assert!(qf.is_shifted[2]);

        assert_eq!(qf.get_remainder(3), 0b0010);
        assert!(!qf.is_continuation[3]);
        assert!(qf.is_shifted[3]);
        assert_invariants(&qf);
    }

    #[test]
    fn duplicate_insert_is_rejected_not_stored() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        let (first, inserted) = qf.insert(0b0001_0001).unwrap();
        assert!(inserted);
        let (again, inserted) = qf.insert(0b0001_0001).unwrap();
        assert!(!inserted);
        assert_eq!(first, again);
        assert_eq!(qf.len(), 1);
        assert_eq!(qf.fingerprint_at(again), 0b0001_0001);
        assert_invariants(&qf);
    }

    #[test]
    fn runs_wrap_around_the_table_end() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b1111_0001).unwrap();
        qf.insert(0b1111_0010).unwrap();

        assert!(qf.is_occupied[15]);
        assert_eq!(qf.get_remainder(15), 0b0001);
        assert_eq!(qf.get_remainder(0), 0b0010);
        assert!(qf.is_continuation[0]);
        assert!(qf.is_shifted[0]);

        assert!(qf.contains(0b1111_0001));
        assert!(qf.contains(0b1111_0010));
        assert!(!qf.contains(0b1111_0011));
    }

    #[test]
    fn find_distinguishes_quotients_and_remainders() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        for fp in [0b0001_0001u64, 0b0010_0010, 0b0001_0011, 0b0100_0001] {
            qf.insert(fp).unwrap();
        }

        for fp in [0b0001_0001u64, 0b0010_0010, 0b0001_0011, 0b0100_0001] {
            let entry = qf.find(fp).expect("inserted fingerprint must be found");
            assert_eq!(qf.fingerprint_at(entry), fp);
        }

        // Same quotient, absent remainder; absent quotient.
        assert_eq!(qf.find(0b0001_0010), None);
        assert_eq!(qf.find(0b0011_0001), None);
        assert!(!qf.contains(0b0010_0001));
    }

    #[test]
    fn erase_absent_returns_zero_and_changes_nothing() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0001).unwrap();
        assert_eq!(qf.erase(0b0001_0010), 0);
        assert_eq!(qf.erase(0b0101_0001), 0);
        assert_eq!(qf.len(), 1);
        assert!(qf.contains(0b0001_0001));
    }

    #[test]
    fn erase_head_promotes_next_element_of_run() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0001).unwrap();
        qf.insert(0b0001_0010).unwrap();
        qf.insert(0b0001_0011).unwrap();

        assert_eq!(qf.erase(0b0001_0001), 1);
        assert_eq!(qf.len(), 2);
        assert!(!qf.contains(0b0001_0001));
        assert!(qf.contains(0b0001_0010));
        assert!(qf.contains(0b0001_0011));

        // The promoted head moved into the canonical slot.
        assert!(qf.is_occupied[1]);
        assert!(!qf.is_continuation[1]);
        assert!(!qf.is_shifted[1]);
        assert_eq!(qf.get_remainder(1), 0b0010);
        assert_invariants(&qf);
    }

    #[test]
    fn erase_last_element_clears_occupied() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0001).unwrap();
        assert_eq!(qf.erase(0b0001_0001), 1);
        assert!(qf.is_empty());
        assert!(!qf.is_occupied[1]);
        assert!(qf.is_empty_slot(1));
    }

    #[test]
    fn erase_middle_of_cluster_compacts_following_runs() {
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(0b0001_0001).unwrap();
        qf.insert(0b0001_0010).unwrap();
        qf.insert(0b0010_0011).unwrap();
        qf.insert(0b0011_0001).unwrap();

        assert_eq!(qf.erase(0b0001_0010), 1);

        // q=2's element slides home to slot 2, q=3's to slot 3.
        assert!(qf.contains(0b0001_0001));
        assert!(qf.contains(0b0010_0011));
        assert!(qf.contains(0b0011_0001));
        assert!(!qf.is_shifted[2]);
        assert_eq!(qf.get_remainder(2), 0b0011);
        assert!(!qf.is_shifted[3]);
        assert_eq!(qf.get_remainder(3), 0b0001);
        assert_invariants(&qf);
    }

    #[test]
    fn insert_then_erase_restores_prior_membership() {
        let mut qf = QuotientFilter::new(6, 6).unwrap();
        let history = [
            0b000001_000001u64,
            0b000001_000100,
            0b000010_000010,
            0b000111_000001,
        ];
        for fp in history {
            qf.insert(fp).unwrap();
        }

        let probe_space: Vec<u64> = (0..1u64 << 12).step_by(7).collect();
        let before: Vec<bool> = probe_space.iter().map(|&p| qf.contains(p)).collect();

        qf.insert(0b000001_000010).unwrap();
        assert_eq!(qf.erase(0b000001_000010), 1);

        let after: Vec<bool> = probe_space.iter().map(|&p| qf.contains(p)).collect();
        assert_eq!(before, after);
        assert_invariants(&qf);
    }

    #[test]
    fn iteration_is_sorted_ascending() {
        // q=4, r=4: 3 sits in the first slot's run; 0b11_1111 = 63 after it.
        let mut qf = QuotientFilter::new(4, 4).unwrap();
        qf.insert(3).unwrap();
        assert_eq!(qf.iter().next(), Some(3));

        assert_eq!(qf.erase(3), 1);
        qf.insert(0b11_1111).unwrap();
        assert_eq!(qf.iter().next(), Some(63));

        qf.insert(5).unwrap();
        qf.insert(5).unwrap();
        qf.insert(2).unwrap();
        qf.insert(9).unwrap();
        let collected: Vec<u64> = qf.iter().collect();
        assert_eq!(collected, vec![2, 5, 9, 63]);
        assert_eq!(qf.iter().len(), 4);
    }

    #[test]
    fn clear_retains_geometry_and_storage() {
        let mut qf = QuotientFilter::new(9, 6).unwrap();
        let mut rng = StdRng::seed_from_u64(0xDECAF);
        let max_fp = low_mask(qf.quotient_bits() + qf.remainder_bits());
        while !qf.is_full() {
            let _ = qf.insert(rng.random::<u64>() & max_fp);
        }

        qf.clear();
        assert!(qf.is_empty());
        assert!(!qf.is_full());
        assert_eq!(qf.capacity(), 1 << 9);
        assert_eq!(qf.quotient_bits(), 9);
        assert_eq!(qf.remainder_bits(), 6);
        assert_eq!(qf.iter().next(), None);

        // The filter is fully usable after clear.
        qf.insert(5).unwrap();
        assert!(qf.contains(5));
        assert_eq!(qf.erase(5), 1);

        let mut reference = BTreeSet::new();
        while !qf.is_full() {
            let fp = rng.random::<u64>() & max_fp;
            if reference.insert(fp) {
                assert!(qf.insert(fp).unwrap().1);
            }
        }
        for fp in &reference {
            assert_eq!(qf.erase(*fp), 1);
        }
        assert!(qf.is_empty());
    }

    // Fill to capacity with random fingerprints, then drain in insertion
    // order, checking membership and size at every step.
    #[test]
    fn fill_then_drain() {
        let mut qf = QuotientFilter::new(10, 8).unwrap();
        let mut reference = BTreeSet::new();
        let mut insertion_order = Vec::new();
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let max_fp = low_mask(18);

        while !qf.is_full() {
            let fp = rng.random::<u64>() & max_fp;
            if reference.insert(fp) {
                assert!(qf.insert(fp).unwrap().1);
                insertion_order.push(fp);
            }
        }
        assert_eq!(qf.len(), 1024);
        assert_eq!(qf.capacity(), 1024);
        assert_invariants(&qf);

        let mut expected_len = qf.len();
        for fp in insertion_order {
            assert_eq!(qf.erase(fp), 1);
            expected_len -= 1;
            assert_eq!(qf.len(), expected_len);
            assert!(!qf.contains(fp));
        }
        assert!(qf.is_empty());
        assert_eq!(qf.iter().next(), None);
    }

    #[test]
    fn full_filter_accepts_duplicates_but_rejects_new_fingerprints() {
        let mut qf = QuotientFilter::new(8, 8).unwrap();
        let mut reference = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(0xFEED);
        let max_fp = low_mask(16);

        while !qf.is_full() {
            let fp = rng.random::<u64>() & max_fp;
            if reference.insert(fp) {
                qf.insert(fp).unwrap();
            }
        }

        let present = *reference.iter().next().unwrap();
        let (entry, inserted) = qf.insert(present).unwrap();
        assert!(!inserted);
        assert_eq!(qf.fingerprint_at(entry), present);

        let absent = (0..=max_fp)
            .find(|fp| !reference.contains(fp))
            .expect("16-bit space is larger than 256 entries");
        assert_eq!(qf.insert(absent), Err(FilterError::Full));
        assert_eq!(qf.len(), qf.capacity());
        assert!(!qf.contains(absent));
    }

    // Mirror law against an ordered reference set under a load-weighted
    // insert/erase workload. r=1 keeps remainders tiny so runs and clusters
    // collide constantly.
    #[test]
    fn mirrors_reference_set_under_mixed_workload() {
        crate::log::init_test_logger();
        let mut qf = QuotientFilter::new(13, 1).unwrap();
        let mut reference: BTreeSet<u64> = BTreeSet::new();
        let mut rng = StdRng::seed_from_u64(0xBADC0DE);
        let max_fp = low_mask(14);

        for step in 0..3 * qf.capacity() {
            let fp = rng.random::<u64>() & max_fp;
            let load = qf.len() as f64 / qf.capacity() as f64;
            let do_insert = !qf.is_full() && (qf.is_empty() || rng.random_bool(1.0 - load));

            if do_insert {
                let inserted = qf.insert(fp).unwrap().1;
                assert_eq!(inserted, reference.insert(fp), "insert disagreed at step {step}");
            } else {
                let removed = qf.erase(fp);
                assert_eq!(removed, reference.remove(&fp) as usize, "erase disagreed at step {step}");
            }

            assert_eq!(qf.len(), reference.len());
            assert_eq!(qf.contains(fp), reference.contains(&fp));
        }

        assert_invariants(&qf);
        let collected: Vec<u64> = qf.iter().collect();
        let expected: Vec<u64> = reference.iter().copied().collect();
        assert_eq!(collected, expected);
    }

    #[test]
    fn remainders_straddle_block_boundaries() {
        // r=60 over 16 slots: nearly every field crosses a u64 boundary.
        let mut qf = QuotientFilter::new(4, 60).unwrap();
        let patterns: Vec<u64> = (0..16u64)
            .map(|i| (0x0123_4567_89AB_CDEF ^ (i * 0x1111_1111)) & low_mask(60))
            .collect();

        for (pos, &value) in patterns.iter().enumerate() {
            qf.set_remainder(pos, value);
        }
        // Neighboring fields must not clobber each other.
        for (pos, &value) in patterns.iter().enumerate() {
            assert_eq!(qf.get_remainder(pos), value, "slot {pos}");
        }

        for (pos, &value) in patterns.iter().enumerate().rev() {
            assert_eq!(qf.exchange_remainder(pos, 0), value);
        }
    }

    #[test]
    fn full_width_remainder_geometry_works() {
        // q=0, r=64: one slot, the whole fingerprint is the remainder.
        let mut qf = QuotientFilter::new(0, 64).unwrap();
        let fp = 0xDEAD_BEEF_CAFE_F00D;
        assert!(qf.insert(fp).unwrap().1);
        assert!(qf.contains(fp));
        assert!(!qf.contains(fp ^ 1));
        assert_eq!(qf.iter().collect::<Vec<u64>>(), vec![fp]);
        assert_eq!(qf.erase(fp), 1);
        assert!(qf.is_empty());
    }

    #[test]
    fn single_slot_filter_works() {
        let mut qf = QuotientFilter::new(0, 8).unwrap();
        assert_eq!(qf.capacity(), 1);
        assert!(qf.insert(0xAB).unwrap().1);
        assert!(qf.is_full());
        assert!(qf.contains(0xAB));
        assert!(!qf.insert(0xAB).unwrap().1);
        assert_eq!(qf.insert(0xCD), Err(FilterError::Full));
        assert_eq!(qf.erase(0xAB), 1);
        assert!(qf.is_empty());
    }
}
