#![allow(unused)]

/// A small deterministic PRNG, used for drawing initial sequence numbers.
///
/// This is sPCG32 from https://www.pcg-random.org/paper.html. It is not
/// cryptographically secure; callers who care about ISN predictability must
/// seed it from a proper entropy source.
#[derive(Debug)]
pub(crate) struct Rand {
    state: u64,
}

impl Rand {
    pub(crate) const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub(crate) fn rand_u32(&mut self) -> u32 {
        const M: u64 = 0xbb2efcec3c39611d;
        const A: u64 = 0x7590ef39;

        let s = self.state.wrapping_mul(M).wrapping_add(A);
        self.state = s;

        let shift = 29 - (s >> 61);
        (s >> shift) as u32
    }
}
