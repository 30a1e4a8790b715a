//! Epoch tokens
//!
//! An epoch names one generation of a history store. Offsets are only
//! meaningful together with the epoch they were issued in.

use parking_lot::RwLock;
use rand::Rng;

/// Alphabet used for epoch tokens (URL-safe)
const EPOCH_ALPHABET: &[u8] = b"_-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of generated epoch tokens
pub const EPOCH_LENGTH: usize = 4;

/// Generate a fresh random epoch token
pub fn generate_epoch() -> String {
    let mut rng = rand::rng();

    (0..EPOCH_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..EPOCH_ALPHABET.len());
            EPOCH_ALPHABET[idx] as char
        })
        .collect()
}

/// Current epoch of a backend, readable from any task
#[derive(Debug, Default)]
pub(crate) struct EpochCell {
    value: RwLock<String>,
}

impl EpochCell {
    pub(crate) fn new(value: String) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub(crate) fn get(&self) -> String {
        self.value.read().clone()
    }

    pub(crate) fn set(&self, value: impl Into<String>) {
        *self.value.write() = value.into();
    }

    /// Compare without cloning
    pub(crate) fn matches(&self, epoch: &str) -> bool {
        *self.value.read() == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_epoch_shape() {
        let epoch = generate_epoch();

        assert_eq!(epoch.len(), EPOCH_LENGTH);
        assert!(epoch.bytes().all(|b| EPOCH_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generated_epochs_differ() {
        let epochs: std::collections::HashSet<_> = (0..32).map(|_| generate_epoch()).collect();

        assert!(epochs.len() > 1);
    }

    #[test]
    fn test_epoch_cell() {
        let cell = EpochCell::new("abcd".into());

        assert!(cell.matches("abcd"));
        cell.set("wxyz");
        assert_eq!(cell.get(), "wxyz");
        assert!(!cell.matches("abcd"));
    }
}
