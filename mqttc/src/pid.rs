//! Packet identifier generation.

use tracing::warn;

/// Generator for 16-bit packet identifiers.
///
/// Starts from a random value in `1..=65535` and counts upward, skipping 0
/// on wraparound.
#[derive(Debug, Clone)]
pub struct PacketIdGenerator {
    current: u16,
}

impl PacketIdGenerator {
    /// Create a generator with a random seed.
    pub fn new() -> Self {
        Self::with_seed(random_seed())
    }

    /// Create a generator whose first `next()` returns `seed + 1`.
    pub fn with_seed(seed: u16) -> Self {
        Self { current: seed }
    }

    /// The identifier most recently returned (or the seed).
    pub fn current(&self) -> u16 {
        self.current
    }

    /// Advance and return the next identifier, never 0.
    pub fn next(&mut self) -> u16 {
        self.current = self.current.wrapping_add(1);
        if self.current == 0 {
            self.current = 1;
        }
        self.current
    }
}

impl Default for PacketIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn random_seed() -> u16 {
    let mut bytes = [0u8; 2];
    if let Err(e) = getrandom::fill(&mut bytes) {
        warn!("getrandom failed ({}), seeding packet ids from the clock", e);
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(1);
        bytes = (nanos as u16).to_be_bytes();
    }
    u16::from_be_bytes(bytes).max(1)
}
