//! Cooldown ledgers for alert dedupe and advisory requests.
//!
//! A [`CooldownLedger`] remembers when an action last fired for a key and
//! reports whether a repeat falls inside its window. Checking and committing
//! are separate operations so a caller can skip the commit when the
//! downstream action fails:
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Duration;
//! use claw_logwatch::{AdvisoryKey, CooldownLedger, ManualClock};
//!
//! let clock = ManualClock::default();
//! let ledger = CooldownLedger::new(Duration::seconds(300), Arc::new(clock.clone()));
//! let key = AdvisoryKey::new("OOMKilled", "worker-1");
//!
//! assert!(!ledger.should_suppress(&key));
//! ledger.record_fired(key.clone());
//! assert!(ledger.should_suppress(&key));
//!
//! clock.advance_secs(300);
//! assert!(!ledger.should_suppress(&key));
//! ```
//!
//! When the action itself is slow, [`CooldownLedger::try_acquire`] reserves the
//! key for the duration of the call. Other callers see the key as suppressed
//! until the returned [`CooldownPermit`] is committed or dropped.
//!
//! Entries are only overwritten, never evicted, so a ledger holds at most one
//! entry per distinct key (targets × patterns). [`CooldownLedger::sweep_expired`]
//! drops entries whose window has elapsed; an expired entry behaves exactly
//! like a missing one, so sweeping never changes a decision.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::types::MonitorTarget;

/// Key for alert dedupe: one entry per (namespace, pod, pattern).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    /// Namespace of the pod.
    pub namespace: String,
    /// Pod name.
    pub pod_name: String,
    /// Matched pattern name.
    pub pattern_name: String,
}

impl AlertKey {
    /// Creates a key for `pattern_name` on `target`.
    #[must_use]
    pub fn new(target: &MonitorTarget, pattern_name: impl Into<String>) -> Self {
        Self {
            namespace: target.namespace.clone(),
            pod_name: target.pod_name.clone(),
            pattern_name: pattern_name.into(),
        }
    }
}

/// Key for advisory cooldown: one entry per (pattern, pod).
///
/// The namespace is not part of the key, so same-named pods in different
/// namespaces share a cooldown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdvisoryKey {
    /// Matched pattern name.
    pub pattern_name: String,
    /// Pod name.
    pub pod_name: String,
}

impl AdvisoryKey {
    /// Creates a key.
    #[must_use]
    pub fn new(pattern_name: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            pattern_name: pattern_name.into(),
            pod_name: pod_name.into(),
        }
    }
}

struct LedgerState<K> {
    fired: HashMap<K, DateTime<Utc>>,
    in_flight: HashSet<K>,
}

/// Time-windowed record of when an action last fired per key.
pub struct CooldownLedger<K> {
    state: Mutex<LedgerState<K>>,
    window: Duration,
    clock: SharedClock,
}

impl<K> std::fmt::Debug for CooldownLedger<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CooldownLedger")
            .field("entries", &state.fired.len())
            .field("in_flight", &state.in_flight.len())
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// A reservation on a ledger key, returned by [`CooldownLedger::try_acquire`].
///
/// [`commit`](Self::commit) records the key as fired. Dropping the permit
/// without committing releases the key with no cooldown.
#[must_use = "dropping a permit releases the key without recording it"]
pub struct CooldownPermit<'a, K: Eq + Hash> {
    ledger: &'a CooldownLedger<K>,
    key: Option<K>,
}

impl<K: Eq + Hash> CooldownPermit<'_, K> {
    /// Records the key as fired now and releases the reservation.
    pub fn commit(mut self) {
        if let Some(key) = self.key.take() {
            let now = self.ledger.clock.now();
            let mut state = self.ledger.state.lock();
            state.in_flight.remove(&key);
            state.fired.insert(key, now);
        }
    }
}

impl<K: Eq + Hash> Drop for CooldownPermit<'_, K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.ledger.state.lock().in_flight.remove(&key);
        }
    }
}

impl<K: Eq + Hash> std::fmt::Debug for CooldownPermit<'_, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownPermit")
            .field("held", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

impl<K> CooldownLedger<K>
where
    K: Eq + Hash,
{
    /// Creates an empty ledger with the given suppression window.
    #[must_use]
    pub fn new(window: Duration, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                fired: HashMap::new(),
                in_flight: HashSet::new(),
            }),
            window,
            clock,
        }
    }

    /// Creates an empty ledger with a window in whole seconds.
    #[must_use]
    pub fn with_window_secs(secs: u64, clock: SharedClock) -> Self {
        Self::new(Duration::seconds(secs as i64), clock)
    }

    /// Returns true if `key` fired less than one window ago.
    ///
    /// Does not modify the ledger. A reserved but uncommitted key is not
    /// reported here; see [`try_acquire`](Self::try_acquire).
    #[must_use]
    pub fn should_suppress(&self, key: &K) -> bool {
        let now = self.clock.now();
        let state = self.state.lock();
        self.is_within_window(state.fired.get(key), now)
    }

    /// Records that `key` fired now.
    pub fn record_fired(&self, key: K) {
        let now = self.clock.now();
        self.state.lock().fired.insert(key, now);
    }

    /// Reserves `key` for a pending action.
    ///
    /// Returns `None` if the key fired less than one window ago or another
    /// permit for it is outstanding. At most one permit per key exists at a
    /// time.
    pub fn try_acquire(&self, key: K) -> Option<CooldownPermit<'_, K>>
    where
        K: Clone,
    {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.in_flight.contains(&key) || self.is_within_window(state.fired.get(&key), now) {
            return None;
        }
        state.in_flight.insert(key.clone());
        Some(CooldownPermit {
            ledger: self,
            key: Some(key),
        })
    }

    /// Returns true if a permit for `key` is outstanding.
    #[must_use]
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.state.lock().in_flight.contains(key)
    }

    /// Checks and commits in one step.
    ///
    /// Returns true, and records the key, if the key was not suppressed.
    /// Concurrent callers for the same key cannot both get true within a window.
    pub fn try_fire(&self, key: K) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if self.is_within_window(state.fired.get(&key), now) {
            return false;
        }
        state.fired.insert(key, now);
        true
    }

    /// Removes entries whose window has elapsed, returning how many were removed.
    ///
    /// Outstanding reservations are kept.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let before = state.fired.len();
        state.fired.retain(|_, last| now - *last < self.window);
        before - state.fired.len()
    }

    /// Returns when `key` last fired.
    #[must_use]
    pub fn last_fired(&self, key: &K) -> Option<DateTime<Utc>> {
        self.state.lock().fired.get(key).copied()
    }

    /// Returns the suppression window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns the number of fired entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().fired.len()
    }

    /// Returns true if the ledger has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_within_window(&self, last: Option<&DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last.is_some_and(|last| now - *last < self.window)
    }
}

/// Ledger deduplicating alerts.
pub type AlertLedger = CooldownLedger<AlertKey>;

/// Ledger rate-limiting advisory requests.
pub type AdvisoryLedger = CooldownLedger<AdvisoryKey>;
