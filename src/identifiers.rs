//! Type-safe identifiers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SubscriptionId`] | One listener's handle in the channel registry |
//! | [`RefCounter`] | Monotonic source of message refs shared by a socket |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

// ============================================================================
// SubscriptionId
// ============================================================================

/// Identifies one listener registered with the channel registry.
///
/// Listeners hold this id instead of the subscription itself, so tearing
/// down the registry never leaves a listener pointing at freed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a new random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RefCounter
// ============================================================================

/// Monotonic counter producing message refs.
///
/// Cloning shares the counter, so every frame written to one socket
/// (heartbeats, joins, leaves) carries a distinct ref.
#[derive(Debug, Clone, Default)]
pub struct RefCounter(Arc<AtomicU64>);

impl RefCounter {
    /// Creates a counter whose first ref is `"1"`.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next ref as a wire string.
    #[inline]
    pub fn next(&self) -> String {
        (self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_ids_are_unique() {
        let a = SubscriptionId::generate();
        let b = SubscriptionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }

    #[test]
    fn test_ref_counter_starts_at_one() {
        let refs = RefCounter::new();
        assert_eq!(refs.next(), "1");
        assert_eq!(refs.next(), "2");
    }

    #[test]
    fn test_ref_counter_clones_share_state() {
        let refs = RefCounter::new();
        let clone = refs.clone();
        assert_eq!(refs.next(), "1");
        assert_eq!(clone.next(), "2");
        assert_eq!(refs.next(), "3");
    }
}
