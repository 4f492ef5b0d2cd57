//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples custody logic from system resources
//! (time, randomness). This enables:
//!
//! - Deterministic Simulation: the harness supplies a virtual clock and a
//!   seeded RNG, so transfer timestamps and request ids reproduce exactly.
//!
//! - Production Runtime: the server and CLI use real system resources
//!   without any change to the program or client logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing time, randomness, and async primitives.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production, since it seeds keypairs
/// 3. Minimal panics: Methods are infallible except in exceptional
///    circumstances (e.g., OS entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time, used for request timeouts.
    fn now(&self) -> Instant;

    /// Returns wall-clock time as seconds since the unix epoch.
    ///
    /// Stamped on custody history entries. Unlike `now()` this may jump when
    /// the system clock is adjusted.
    fn unix_time(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not program logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Security
    ///
    /// Production implementations MUST use the OS entropy pool
    /// (`getrandom`). Simulation implementations MUST use a seeded RNG and
    /// the seed MUST be logged for reproducibility.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, e.g. for request or connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates a 32-byte seed for a new keypair.
    fn random_seed(&self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        self.random_bytes(&mut seed);
        seed
    }
}
