// Rolling Identifier Allocator
// Hands out the next free small integer from a bounded range, round-robin

use rand::Rng;

/// Rolling allocator over an inclusive `u8` range.
///
/// Each call continues from the value after the last one issued, skips the
/// reserved set and anything the caller reports as in use, and wraps at
/// the end of the range. Returns `None` only when every candidate is
/// reserved or in use.
#[derive(Debug, Clone)]
pub struct RollingIdAllocator {
    min: u8,
    max: u8,
    reserved: Vec<u8>,
    cursor: u8,
}

impl RollingIdAllocator {
    /// Create an allocator whose first candidate is `min`
    pub fn new(min: u8, max: u8, reserved: &[u8]) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            reserved: reserved.to_vec(),
            cursor: min,
        }
    }

    /// Create an allocator whose first candidate is drawn at random
    pub fn with_random_start(min: u8, max: u8, reserved: &[u8]) -> Self {
        let mut allocator = Self::new(min, max, reserved);
        allocator.cursor = rand::thread_rng().gen_range(allocator.min..=allocator.max);
        allocator
    }

    /// Move the next candidate to `start` (clamped into range)
    pub fn with_start(mut self, start: u8) -> Self {
        self.cursor = start.clamp(self.min, self.max);
        self
    }

    /// Number of values in the range that are not reserved
    pub fn capacity(&self) -> usize {
        (self.min..=self.max)
            .filter(|v| !self.reserved.contains(v))
            .count()
    }

    pub fn is_reserved(&self, value: u8) -> bool {
        self.reserved.contains(&value)
    }

    /// Allocate the next value for which `in_use` returns false
    pub fn next_free(&mut self, in_use: impl Fn(u8) -> bool) -> Option<u8> {
        let span = usize::from(self.max - self.min) + 1;
        let mut candidate = self.cursor;

        for _ in 0..span {
            let next = self.step(candidate);
            if !self.reserved.contains(&candidate) && !in_use(candidate) {
                self.cursor = next;
                return Some(candidate);
            }
            candidate = next;
        }
        None
    }

    fn step(&self, value: u8) -> u8 {
        if value >= self.max {
            self.min
        } else {
            value + 1
        }
    }
}
