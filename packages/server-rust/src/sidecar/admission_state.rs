//! Rate-windowed admission state machine.
//!
//! State is re-evaluated lazily on each [`AdmissionContext::try_accept`]
//! call rather than on a timer. Once at least one window has passed since
//! the last transition, the attempts counted in between are turned into a
//! per-second rate that picks the next state:
//!
//! | rate                 | state    | rejected |
//! |----------------------|----------|----------|
//! | `<= minor`           | `Normal` | 0%       |
//! | `<= major`           | `Minor`  | ~20%     |
//! | `> major`            | `Major`  | ~50%     |

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::Rng;
use sidemesh_core::ClockSource;
use tracing::debug;

use crate::config::AdmissionConfig;

/// Admission level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionState {
    Normal,
    Minor,
    Major,
}

impl AdmissionState {
    /// State selected for an observed rate of `rate` attempts per second.
    #[must_use]
    pub fn for_rate(rate: u64, config: &AdmissionConfig) -> Self {
        if rate <= config.minor_rate_threshold {
            Self::Normal
        } else if rate <= config.major_rate_threshold {
            Self::Minor
        } else {
            Self::Major
        }
    }

    /// Percentage of attempts rejected in this state.
    #[must_use]
    pub fn reject_percent(self, config: &AdmissionConfig) -> u32 {
        match self {
            Self::Normal => 0,
            Self::Minor => config.minor_reject_percent,
            Self::Major => config.major_reject_percent,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }
}

/// Shared counters and current state of one admission controller.
///
/// Safe under concurrent callers: attempts are counted with an atomic
/// increment, and a window is closed by whichever caller wins the
/// compare-and-swap on the transition timestamp. Losers simply evaluate the
/// state that is current when they look.
pub struct AdmissionContext {
    attempts: AtomicU64,
    last_transition_ms: AtomicU64,
    state: ArcSwap<AdmissionState>,
    clock: Arc<dyn ClockSource>,
    config: AdmissionConfig,
}

impl AdmissionContext {
    /// Starts in `Normal` with the window opening now.
    #[must_use]
    pub fn new(config: AdmissionConfig, clock: Arc<dyn ClockSource>) -> Self {
        let now = clock.now();
        Self {
            attempts: AtomicU64::new(0),
            last_transition_ms: AtomicU64::new(now),
            state: ArcSwap::from_pointee(AdmissionState::Normal),
            clock,
            config,
        }
    }

    #[must_use]
    pub fn current_state(&self) -> AdmissionState {
        **self.state.load()
    }

    /// Counts one attempt, possibly transitions, then rolls the current
    /// state's dice. Returns `true` if the attempt is admitted.
    pub fn try_accept(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        self.try_transition();

        let percent = self.current_state().reject_percent(&self.config);
        percent == 0 || rand::rng().random_range(0..100) >= percent
    }

    fn try_transition(&self) {
        let now = self.clock.now();
        let last = self.last_transition_ms.load(Ordering::Acquire);
        let elapsed_ms = now.saturating_sub(last);
        let window_ms = u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX);
        if elapsed_ms < window_ms {
            return;
        }
        if self
            .last_transition_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Another caller closed this window.
            return;
        }

        let count = self.attempts.swap(0, Ordering::AcqRel);
        let rate = count / (elapsed_ms / 1000).max(1);
        let next = AdmissionState::for_rate(rate, &self.config);
        let previous = self.current_state();
        if next != previous {
            debug!(
                from = previous.as_str(),
                to = next.as_str(),
                rate,
                "admission state changed"
            );
            self.state.store(Arc::new(next));
        }
    }
}
