//! Connectivity state: whether the remote backend should be attempted.
//!
//! The probe result is memoized for the life of the process. It is never
//! re-probed on a timer; instead every pipeline call that reaches the remote
//! records its result here, so availability heals itself. The forced-offline
//! override always wins over the probed value.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const UNKNOWN: u8 = 0;
const AVAILABLE: u8 = 1;
const UNAVAILABLE: u8 = 2;

#[derive(Debug)]
pub struct Connectivity {
  probed: AtomicU8,
  forced_offline: AtomicBool,
}

impl Connectivity {
  pub fn new(forced_offline: bool) -> Self {
    Self {
      probed: AtomicU8::new(UNKNOWN),
      forced_offline: AtomicBool::new(forced_offline),
    }
  }

  pub fn is_forced_offline(&self) -> bool {
    self.forced_offline.load(Ordering::SeqCst)
  }

  /// Set or clear the forced-offline override.
  pub fn set_forced_offline(&self, offline: bool) {
    self.forced_offline.store(offline, Ordering::SeqCst);
    tracing::info!(offline, "Offline override changed");
  }

  /// The memoized probe result, if any.
  pub fn known(&self) -> Option<bool> {
    match self.probed.load(Ordering::SeqCst) {
      AVAILABLE => Some(true),
      UNAVAILABLE => Some(false),
      _ => None,
    }
  }

  /// Record the outcome of a call that reached (or failed to reach) the remote.
  pub fn record(&self, reachable: bool) {
    let next = if reachable { AVAILABLE } else { UNAVAILABLE };
    let previous = self.probed.swap(next, Ordering::SeqCst);
    if previous != next && previous != UNKNOWN {
      tracing::info!(reachable, "Remote availability changed");
    }
  }

  /// Forget the memoized result so the next check probes again.
  pub fn reset(&self) {
    self.probed.store(UNKNOWN, Ordering::SeqCst);
  }

  /// Whether the remote should be attempted right now.
  ///
  /// Probes only when nothing is memoized. Concurrent first callers may each
  /// probe; the last result wins.
  pub async fn is_available<F, Fut>(&self, probe: F) -> bool
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = bool>,
  {
    if self.is_forced_offline() {
      return false;
    }
    if let Some(known) = self.known() {
      return known;
    }
    let reachable = probe().await;
    self.record(reachable);
    reachable
  }

  /// Probe again regardless of the memoized value.
  pub async fn refresh<F, Fut>(&self, probe: F) -> bool
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = bool>,
  {
    self.reset();
    self.is_available(probe).await
  }
}

impl Default for Connectivity {
  fn default() -> Self {
    Self::new(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicU32;

  #[tokio::test]
  async fn test_probe_is_memoized() {
    let probes = AtomicU32::new(0);
    let state = Connectivity::default();

    for _ in 0..3 {
      let available = state
        .is_available(|| async {
          probes.fetch_add(1, Ordering::SeqCst);
          true
        })
        .await;
      assert!(available);
    }
    assert_eq!(probes.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_forced_offline_wins() {
    let state = Connectivity::new(true);
    state.record(true);
    assert!(!state.is_available(|| async { true }).await);

    state.set_forced_offline(false);
    assert!(state.is_available(|| async { false }).await);
  }

  #[tokio::test]
  async fn test_recorded_results_self_heal() {
    let state = Connectivity::default();
    assert!(!state.is_available(|| async { false }).await);

    state.record(true);
    assert_eq!(state.known(), Some(true));
    assert!(state.is_available(|| async { false }).await);
  }

  #[tokio::test]
  async fn test_refresh_reprobes() {
    let state = Connectivity::default();
    state.record(false);
    assert!(state.refresh(|| async { true }).await);
    assert_eq!(state.known(), Some(true));
  }
}
