//! Process-wide keying for the table's hasher.
//!
//! The key is not a secret in the cryptographic sense — its job is to
//! randomize bucket distributions across processes so that two runs of
//! the same program, or a remote attacker who knows the algorithm, can't
//! predict which elements collide (spec.md §4.1).

use std::convert::TryInto;
use std::sync::OnceLock;

/// Where [`SecretKey::global`] draws its 128 bits from.
#[derive(Debug, Clone, Copy)]
pub enum KeySource {
    /// 16 bytes from the platform's secure random source (the default).
    OsRandom,
    /// A fixed, developer-supplied key. For tests only: fixing the key
    /// makes bucket layout — and therefore iteration order — reproducible.
    Fixed(u64, u64),
}

/// A 128-bit pair `(k0, k1)`, set exactly once for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretKey {
    k0: u64,
    k1: u64,
}

impl SecretKey {
    fn from_source(source: KeySource) -> SecretKey {
        match source {
            KeySource::Fixed(k0, k1) => SecretKey { k0, k1 },
            KeySource::OsRandom => {
                let mut bytes = [0u8; 16];
                getrandom::getrandom(&mut bytes)
                    .expect("platform secure random source unavailable");
                let k0 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
                let k1 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
                SecretKey { k0, k1 }
            }
        }
    }

    /// Returns the process-wide key, initializing it from `KeySource::OsRandom`
    /// on first use. Every later call — and every call made concurrently
    /// with the first — observes the same, fully-constructed pair.
    pub fn global() -> SecretKey {
        static KEY: OnceLock<SecretKey> = OnceLock::new();
        *KEY.get_or_init(|| SecretKey::from_source(KeySource::OsRandom))
    }

    /// Builds a standalone key from an explicit source, bypassing the
    /// process-wide singleton. Intended for tests that need a
    /// reproducible, fixed key (`KeySource::Fixed`).
    pub fn with_source(source: KeySource) -> SecretKey {
        SecretKey::from_source(source)
    }

    /// The `(k0, k1)` pair, as consumed by [`crate::sip::Hasher::new`].
    pub fn keys(&self) -> (u64, u64) {
        (self.k0, self.k1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_key_is_stable_across_calls() {
        assert_eq!(SecretKey::global(), SecretKey::global());
    }

    #[test]
    fn fixed_source_is_deterministic() {
        let a = SecretKey::with_source(KeySource::Fixed(1, 2));
        let b = SecretKey::with_source(KeySource::Fixed(1, 2));
        assert_eq!(a, b);
        assert_eq!(a.keys(), (1, 2));
    }
}
