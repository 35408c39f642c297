//! Uniform reservoir sampling for large libraries, so the shuffle engine
//! never has to materialize the whole eligible set in memory. The reservoir
//! is deliberately oversampled relative to the final selection size; weights
//! are computed afterward, on the reservoir only.

use rand::Rng;

use crate::models::Song;

/// Standard reservoir sampling (Algorithm R): the first `capacity` items
/// always fill the reservoir; past that, item `n` replaces a uniformly
/// random existing slot with probability `capacity / n`.
pub struct UniformReservoir {
    capacity: usize,
    seen: usize,
    items: Vec<Song>,
}

impl UniformReservoir {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            seen: 0,
            items: Vec::with_capacity(capacity),
        }
    }

    pub fn offer(&mut self, song: Song, rng: &mut impl Rng) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(song);
            return;
        }
        if self.capacity == 0 {
            return;
        }
        let j = rng.random_range(0..self.seen);
        if j < self.capacity {
            self.items[j] = song;
        }
    }

    pub fn into_songs(self) -> Vec<Song> {
        self.items
    }
}
