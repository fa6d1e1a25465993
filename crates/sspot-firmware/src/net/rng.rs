//! Hardware RNG adapter for the TLS handshake

use esp_hal::rng::Rng;
use rand_core::{CryptoRng, RngCore};

/// True random numbers while the radio is running
pub struct HardwareRng(Rng);

impl HardwareRng {
    pub fn new(rng: Rng) -> Self {
        Self(rng)
    }

    /// Seed for the network stack's port randomisation
    pub fn seed(&mut self) -> u64 {
        self.next_u64()
    }
}

impl RngCore for HardwareRng {
    fn next_u32(&mut self) -> u32 {
        self.0.random()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let word = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for HardwareRng {}
