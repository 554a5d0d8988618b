//! Types shared across the storage layer.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The unit persisted per key.
///
/// `timestamp` is always stamped at write time by [`Envelope::new`]; callers
/// never supply it. A `ttl` of `None` (or zero) never expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The logical payload.
    pub value: T,
    /// Milliseconds since the Unix epoch at write time.
    pub timestamp: i64,
    /// Maximum age in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl<T> Envelope<T> {
    /// Wraps a value stamped with the current time.
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            timestamp: now_millis(),
            ttl: ttl.map(duration_millis),
        }
    }

    /// Checks expiry against an explicit clock reading.
    ///
    /// An entry is expired once strictly more than `ttl` milliseconds have
    /// elapsed since it was written.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        match self.ttl {
            Some(ttl) if ttl > 0 => {
                let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
                now_ms.saturating_sub(self.timestamp) > ttl
            },
            _ => false,
        }
    }

    /// Checks expiry against the current time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Current wall clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Identifies one execution context attached to a shared medium.
///
/// Change events carry the id of the context that caused them, so a context
/// never reacts to its own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Change notification emitted by a shared medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Namespaced key that changed.
    pub key: String,
    /// New raw value, `None` when the key was removed.
    pub new_value: Option<String>,
    /// Context that performed the change.
    pub origin: ContextId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_ttl_never_expires() {
        let envelope = Envelope::new("v", None);
        assert!(!envelope.is_expired_at(envelope.timestamp + 10_000_000));
    }

    #[test]
    fn test_envelope_expiry_is_strict() {
        let envelope = Envelope {
            value: 1,
            timestamp: 1_000,
            ttl: Some(50),
        };
        assert!(!envelope.is_expired_at(1_049));
        assert!(!envelope.is_expired_at(1_050));
        assert!(envelope.is_expired_at(1_051));
    }

    #[test]
    fn test_zero_ttl_means_no_expiry() {
        let envelope = Envelope {
            value: 1,
            timestamp: 0,
            ttl: Some(0),
        };
        assert!(!envelope.is_expired_at(i64::MAX));
    }

    #[test]
    fn test_ttl_omitted_from_wire_format_when_absent() {
        let envelope = Envelope {
            value: "v",
            timestamp: 42,
            ttl: None,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert_eq!(json, r#"{"value":"v","timestamp":42}"#);

        let with_ttl = Envelope {
            value: "v",
            timestamp: 42,
            ttl: Some(7),
        };
        let json = serde_json::to_string(&with_ttl).unwrap();
        assert_eq!(json, r#"{"value":"v","timestamp":42,"ttl":7}"#);
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = ContextId::next();
        let b = ContextId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }
}
