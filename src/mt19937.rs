//! Software mirror of the MT19937 generator observed in the target process.
//!
//! The mirror never seeds itself; it is reset from a state snapshot read out
//! of the target and then re-twisted ahead of it. A small cache of future
//! states lets [`Mt19937::sync`] absorb the bounded number of outputs the
//! target consumes between two probes without a full reset.

use std::collections::VecDeque;

use log::warn;

/// Number of 32-bit words in one MT19937 state.
pub const N: usize = 624;

const M: usize = 397;
const UPPER_MASK: u32 = 0x8000_0000;
const LOWER_MASK: u32 = 0x7fff_ffff;
const MATRIX_A: u32 = 0x9908_b0df;

/// Upper bound on the number of twisted states kept by the mirror.
pub const NUM_NEXT_STATES: usize = 10;

/// One full 624-word generator state.
pub type MtState = [u32; N];

/// The standard MT19937 output mixer.
pub fn temper(word: u32) -> u32 {
    let mut y = word;
    y ^= y >> 11;
    y ^= (y << 7) & 0x9d2c_5680;
    y ^= (y << 15) & 0xefc6_0000;
    y ^= y >> 18;
    y
}

/// Advances a state by one full twist, writing into a fresh buffer.
///
/// All inputs are read from the old buffer, so the wrap-around cases at the
/// end of the array see the untouched values.
pub fn twist(state: &MtState) -> MtState {
    let mut next = [0u32; N];
    for i in 0..N {
        let y = (state[i] & UPPER_MASK) | (state[(i + 1) % N] & LOWER_MASK);
        let mag = if y & 1 == 0 { 0 } else { MATRIX_A };
        next[i] = state[(i + M) % N] ^ (y >> 1) ^ mag;
    }
    next
}

/// Local clone of the observed generator.
///
/// Holds a deque of up to [`NUM_NEXT_STATES`] contiguous twisted states,
/// oldest first, and a cursor into the head state. Element `k` of the deque
/// is the state after `k` twists from the oldest cached state.
#[derive(Debug, Default)]
pub struct Mt19937 {
    states: VecDeque<Box<MtState>>,
    mti: usize,
}

impl Mt19937 {
    pub fn new() -> Self {
        Self {
            states: VecDeque::with_capacity(NUM_NEXT_STATES),
            mti: 0,
        }
    }

    /// Replaces the cache with a single observed state, discarding history.
    ///
    /// An index of 624 is the twist boundary the external generator produces
    /// right after initialization; it is normalized to 0.
    pub fn reset_from_state(&mut self, state: Box<MtState>, mti: u32) {
        let mut mti = mti as usize;
        if mti >= N {
            warn!("normalizing an out-of-range mti of {} to {}", mti, mti % N);
            mti %= N;
        }

        self.states.clear();
        self.states.push_back(state);
        self.mti = mti;
    }

    /// Whether the mirror holds a state to project from.
    pub fn has_data(&self) -> bool {
        !self.states.is_empty()
    }

    /// The next `n` tempered outputs starting at the cursor.
    ///
    /// Does not move the cursor. States missing from the cache are generated
    /// by twisting the newest cached state; the lookahead is bounded by the
    /// cache capacity, so `n` is clamped to `NUM_NEXT_STATES * 624 - mti`.
    pub fn next_elements(&mut self, n: usize) -> Vec<u32> {
        if self.states.is_empty() {
            return Vec::new();
        }

        let n = n.min(NUM_NEXT_STATES * N - self.mti);
        let mut els = Vec::with_capacity(n);
        for k in 0..n {
            let idx = (self.mti + k) % N;
            let ahead = (self.mti + k) / N;
            self.extend_to(ahead + 1);
            els.push(temper(self.states[ahead][idx]));
        }
        els
    }

    /// The next `n` outputs reduced modulo 100.
    pub fn next_percentages(&mut self, n: usize) -> Vec<i32> {
        self.next_elements(n)
            .into_iter()
            .map(|el| (el % 100) as i32)
            .collect()
    }

    /// Re-aligns the mirror with an observed `(element, mti)` pair.
    ///
    /// Looks the element up at position `mti` of every cached state. On a
    /// hit, states older than the hit are evicted and the cursor moves to
    /// `mti`; the mirror is then exactly where the target is. On a miss the
    /// caller has to [`Self::reset_from_state`].
    pub fn sync(&mut self, element: u32, mti: u32) -> bool {
        let idx = mti as usize;
        if idx >= N {
            warn!("trying to sync a bad mti: {mti}");
            return false;
        }

        match self.states.iter().position(|mt| mt[idx] == element) {
            Some(age) => {
                self.states.drain(..age);
                self.mti = idx;
                true
            }
            None => {
                warn!("cannot find element {element:#010x} at mti {mti}, mirror needs a reset");
                false
            }
        }
    }

    fn extend_to(&mut self, count: usize) {
        while self.states.len() < count.min(NUM_NEXT_STATES) {
            let Some(last) = self.states.back() else {
                return;
            };
            let next = Box::new(twist(last));
            self.states.push_back(next);
        }
    }

    #[cfg(test)]
    fn cached_states(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // init_genrand from the canonical mt19937ar reference.
    fn seeded_state(seed: u32) -> Box<MtState> {
        let mut mt = Box::new([0u32; N]);
        mt[0] = seed;
        for i in 1..N {
            mt[i] = 1_812_433_253u32
                .wrapping_mul(mt[i - 1] ^ (mt[i - 1] >> 30))
                .wrapping_add(i as u32);
        }
        mt
    }

    // First outputs of the canonical generator seeded with 5489.
    const REFERENCE_HEAD: [u32; 10] = [
        3499211612, 581869302, 3890346734, 3586334585, 545404204, 4161255391, 3922919429,
        949333985, 2715962298, 1323567403,
    ];

    #[test]
    fn temper_is_deterministic() {
        for w in [0, 1, 0xdead_beef, u32::MAX] {
            assert_eq!(temper(w), temper(w));
        }
        assert_eq!(temper(0), 0);
    }

    #[test]
    fn twist_matches_reference_vector() {
        // The real generator twists the freshly seeded array before its
        // first output, so the reference head is the temper of the state
        // after one twist.
        let first = twist(&seeded_state(5489));
        for (i, &expected) in REFERENCE_HEAD.iter().enumerate() {
            assert_eq!(temper(first[i]), expected, "output {i}");
        }
    }

    #[test]
    fn twist_reaches_canonical_ten_thousandth_output() {
        // Output 10000 of the default-seeded generator is pinned by the
        // C++ standard to 4123659995.
        let mut state = twist(&seeded_state(5489));
        for _ in 0..(9999 / N) {
            state = twist(&state);
        }
        assert_eq!(temper(state[9999 % N]), 4123659995);
    }

    #[test]
    fn mirror_projects_reference_head() {
        let mut rng = Mt19937::new();
        rng.reset_from_state(Box::new(twist(&seeded_state(5489))), 0);

        assert_eq!(rng.next_elements(10), REFERENCE_HEAD);
        let pcs = rng.next_percentages(10);
        let expected: Vec<i32> = REFERENCE_HEAD.iter().map(|&el| (el % 100) as i32).collect();
        assert_eq!(pcs, expected);
    }

    #[test]
    fn reset_discards_history() {
        let state = twist(&seeded_state(1));
        let mut rng = Mt19937::new();

        rng.reset_from_state(Box::new(state), 0);
        let fresh = rng.next_elements(20);

        // Pollute the cache and cursor, then reset to the same observation.
        rng.next_elements(3000);
        rng.sync(twist(&state)[5], 5);
        rng.reset_from_state(Box::new(state), 0);

        assert_eq!(rng.next_elements(20), fresh);
    }

    #[test]
    fn reset_normalizes_boundary_mti() {
        let state = twist(&seeded_state(7));
        let mut rng = Mt19937::new();
        rng.reset_from_state(Box::new(state), N as u32);
        assert_eq!(rng.next_elements(1), vec![temper(state[0])]);
    }

    #[test]
    fn sync_moves_to_observed_position() {
        let s0 = twist(&seeded_state(42));
        let s1 = twist(&s0);
        let mut rng = Mt19937::new();
        rng.reset_from_state(Box::new(s0), 600);

        // Force the next state into the cache, then observe the target one
        // full twist and a few outputs ahead.
        rng.next_elements(100);
        assert!(rng.sync(s1[10], 10));
        assert_eq!(rng.next_elements(1), vec![temper(s1[10])]);
    }

    #[test]
    fn sync_rejects_unknown_element() {
        let s0 = twist(&seeded_state(42));
        let mut rng = Mt19937::new();
        rng.reset_from_state(Box::new(s0), 0);

        assert!(!rng.sync(!s0[3], 3));
        assert!(!rng.sync(s0[0], N as u32));
        // A failed sync leaves the mirror untouched.
        assert_eq!(rng.next_elements(1), vec![temper(s0[0])]);
    }

    #[test]
    fn lookahead_cache_stays_bounded() {
        let mut rng = Mt19937::new();
        rng.reset_from_state(seeded_state(9), 0);

        rng.next_elements(NUM_NEXT_STATES * N + 5000);
        assert!(rng.cached_states() <= NUM_NEXT_STATES);

        // The bounded prefix is still exact.
        assert_eq!(
            rng.next_elements(usize::MAX).len(),
            NUM_NEXT_STATES * N
        );
    }

    #[test]
    fn empty_mirror_has_no_data() {
        let mut rng = Mt19937::new();
        assert!(!rng.has_data());
        assert!(rng.next_elements(10).is_empty());
        assert!(rng.next_percentages(10).is_empty());
    }
}
