use std::hash::{Hash, Hasher};

/// A deterministic FNV-1a 64-bit hasher.
///
/// `DefaultHasher` is randomly keyed per process, so anything that must agree
/// across runs (roster fingerprints, fallback narrative selection) goes
/// through this instead.
#[derive(Debug, Clone)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Hash a sequence of values into a single stable fingerprint.
pub fn fingerprint<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = FnvHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_offset_basis() {
        let hasher = FnvHasher::new();
        assert_eq!(hasher.finish(), 0xcbf29ce484222325);
    }

    #[test]
    fn known_vector_matches_reference() {
        let mut hasher = FnvHasher::new();
        hasher.write(b"a");
        assert_eq!(hasher.finish(), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn fingerprint_is_stable_for_equal_values() {
        assert_eq!(fingerprint("secret_crush"), fingerprint("secret_crush"));
        assert_ne!(fingerprint("secret_crush"), fingerprint("rivalry"));
    }
}
