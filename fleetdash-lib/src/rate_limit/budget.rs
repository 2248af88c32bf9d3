//! Sliding window call budget.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding window budget for live upstream calls.
///
/// Unlike a blocking rate limiter, the budget never waits: when the window
/// is full, [`try_acquire`](Self::try_acquire) reports how long until a slot
/// frees up and the orchestrator serves stale data instead of calling out.
///
/// Cheap to clone; clones share the same window.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use fleetdash_lib::rate_limit::CallBudget;
///
/// // 100 upstream calls per minute
/// let budget = CallBudget::new(100, Duration::from_secs(60));
/// assert_eq!(budget.capacity(), 100);
/// ```
#[derive(Clone, Debug)]
pub struct CallBudget {
    inner: Arc<CallBudgetInner>,
}

#[derive(Debug)]
struct CallBudgetInner {
    /// Timestamps of calls within the window.
    timestamps: Mutex<VecDeque<Instant>>,
    capacity: u32,
    window: Duration,
}

impl CallBudget {
    /// Creates a new budget of `capacity` calls per `window`.
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(CallBudgetInner {
                timestamps: Mutex::new(VecDeque::with_capacity(capacity as usize)),
                capacity,
                window,
            }),
        }
    }

    /// Takes one slot if available.
    ///
    /// Returns `Err(wait)` with the time until the oldest call leaves the
    /// window when the budget is exhausted.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut timestamps = self.inner.timestamps.lock().await;
        let now = Instant::now();
        prune(&mut timestamps, now, self.inner.window);

        if (timestamps.len() as u32) < self.inner.capacity {
            timestamps.push_back(now);
            return Ok(());
        }

        let wait = timestamps
            .front()
            .map(|&oldest| (oldest + self.inner.window).saturating_duration_since(now))
            .unwrap_or(self.inner.window);
        Err(wait)
    }

    /// Returns the number of calls that can be made immediately.
    pub async fn available(&self) -> u32 {
        let mut timestamps = self.inner.timestamps.lock().await;
        prune(&mut timestamps, Instant::now(), self.inner.window);

        self.inner
            .capacity
            .saturating_sub(timestamps.len() as u32)
    }

    /// Returns the configured capacity.
    pub fn capacity(&self) -> u32 {
        self.inner.capacity
    }

    /// Returns the configured window duration.
    pub fn window(&self) -> Duration {
        self.inner.window
    }
}

fn prune(timestamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&ts) = timestamps.front() {
        if now.duration_since(ts) >= window {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
