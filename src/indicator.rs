//! Visual turn indicator with a debounced auto-reset
//!
//! The indicator is a binary state (idle or active) plus at most one pending
//! reset timer. Every write, including the timer firing, goes through one
//! mutex, so a reset can never interleave with a concurrent state change.
//! Scheduling a reset replaces any pending one: N rapid calls produce exactly
//! one reset, timed from the last call.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Indicator state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndicatorState {
    /// No turn in progress
    #[default]
    Idle,
    /// A turn is running or just finished
    Active,
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

struct Inner {
    state: watch::Sender<IndicatorState>,
    /// Bumped on every schedule/cancel; a timer only fires if it still matches
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl Inner {
    fn set(&self, state: IndicatorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "indicator state");
        }
    }

    fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        self.pending.take().is_some_and(|handle| {
            handle.abort();
            true
        })
    }
}

/// Shared handle to the process-wide indicator
///
/// Cloning is cheap; all clones drive the same state and timer.
#[derive(Clone)]
pub struct Indicator {
    inner: Arc<Mutex<Inner>>,
}

impl Default for Indicator {
    fn default() -> Self {
        Self::new()
    }
}

impl Indicator {
    /// Create an idle indicator with no pending reset
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(IndicatorState::Idle);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                generation: 0,
                pending: None,
            })),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> IndicatorState {
        *self.inner.lock().state.borrow()
    }

    /// Subscribe to state changes (e.g. to drive LEDs)
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IndicatorState> {
        self.inner.lock().state.subscribe()
    }

    /// Set the state immediately, leaving any pending reset in place
    pub fn set_state(&self, state: IndicatorState) {
        self.inner.lock().set(state);
    }

    /// Cancel any pending reset and go active
    pub fn activate(&self) {
        let mut inner = self.inner.lock();
        if inner.cancel() {
            tracing::trace!("pending reset cancelled by activation");
        }
        inner.set(IndicatorState::Active);
    }

    /// Cancel any pending reset and go idle now
    pub fn force_idle(&self) {
        let mut inner = self.inner.lock();
        inner.cancel();
        inner.set(IndicatorState::Idle);
    }

    /// Cancel any pending reset
    ///
    /// Returns true if a reset was pending
    pub fn cancel_reset(&self) -> bool {
        self.inner.lock().cancel()
    }

    /// Whether a reset is scheduled and has not fired yet
    #[must_use]
    pub fn is_reset_pending(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// Go idle after `delay`, replacing any pending reset
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime
    pub fn schedule_reset(&self, delay: Duration) {
        let mut inner = self.inner.lock();
        if inner.cancel() {
            tracing::trace!("pending reset replaced");
        }

        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        let deadline = tokio::time::Instant::now() + delay;

        inner.pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            let mut inner = shared.lock();
            if inner.generation != generation {
                // Superseded after the sleep finished but before we got the lock
                return;
            }
            inner.pending = None;
            inner.set(IndicatorState::Idle);
            tracing::debug!("auto-reset to idle");
        }));

        tracing::trace!(delay_ms = delay.as_millis(), "indicator reset scheduled");
    }
}

impl fmt::Debug for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indicator")
            .field("state", &self.state())
            .field("reset_pending", &self.is_reset_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_secs(5);

    #[test]
    fn test_starts_idle() {
        let indicator = Indicator::new();
        assert_eq!(indicator.state(), IndicatorState::Idle);
        assert!(!indicator.is_reset_pending());
    }

    #[test]
    fn test_set_state_overwrites() {
        let indicator = Indicator::new();
        indicator.set_state(IndicatorState::Active);
        assert_eq!(indicator.state(), IndicatorState::Active);
        indicator.set_state(IndicatorState::Active);
        assert_eq!(indicator.state(), IndicatorState::Active);
        indicator.set_state(IndicatorState::Idle);
        assert_eq!(indicator.state(), IndicatorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_fires_after_delay() {
        let indicator = Indicator::new();
        indicator.set_state(IndicatorState::Active);
        indicator.schedule_reset(DELAY);

        tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
        assert_eq!(indicator.state(), IndicatorState::Active);
        assert!(indicator.is_reset_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(indicator.state(), IndicatorState::Idle);
        assert!(!indicator.is_reset_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_resets_debounce_to_last_call() {
        let indicator = Indicator::new();
        indicator.set_state(IndicatorState::Active);

        for _ in 0..3 {
            indicator.schedule_reset(DELAY);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        // Last call at t=2s, so the reset is due at t=7s; now t=3s

        tokio::time::sleep(Duration::from_millis(3900)).await;
        assert_eq!(indicator.state(), IndicatorState::Active, "fired early");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(indicator.state(), IndicatorState::Idle);

        // No superseded timer may fire later
        indicator.set_state(IndicatorState::Active);
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(indicator.state(), IndicatorState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reset() {
        let indicator = Indicator::new();
        indicator.set_state(IndicatorState::Active);
        indicator.schedule_reset(DELAY);

        assert!(indicator.cancel_reset());
        assert!(!indicator.cancel_reset());

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(indicator.state(), IndicatorState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_cancels_pending_reset() {
        let indicator = Indicator::new();
        indicator.set_state(IndicatorState::Active);
        indicator.schedule_reset(DELAY);

        tokio::time::sleep(Duration::from_secs(4)).await;
        indicator.activate();

        tokio::time::sleep(DELAY).await;
        assert_eq!(indicator.state(), IndicatorState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_idle_is_immediate() {
        let indicator = Indicator::new();
        indicator.activate();
        indicator.schedule_reset(DELAY);

        indicator.force_idle();
        assert_eq!(indicator.state(), IndicatorState::Idle);
        assert!(!indicator.is_reset_pending());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let indicator = Indicator::new();
        let mut rx = indicator.subscribe();

        indicator.activate();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), IndicatorState::Active);

        indicator.force_idle();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), IndicatorState::Idle);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(IndicatorState::Idle.to_string(), "idle");
        assert_eq!(IndicatorState::Active.to_string(), "active");
    }
}
