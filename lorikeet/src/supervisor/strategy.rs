use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_RESTARTS: usize = 3;
pub const DEFAULT_RESTART_PERIOD: Duration = Duration::from_secs(5);

/// Which children are restarted when one of them terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Only the terminated child.
    OneForOne,
    /// Every child.
    OneForAll,
    /// The terminated child and every child declared after it.
    RestForOne,
}

/// Restart strategy with its intensity limit: at most `max_restarts`
/// restarts within any `period`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub max_restarts: usize,
    pub period: Duration,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::one_for_one()
    }
}

impl Strategy {
    pub fn new(kind: StrategyKind, max_restarts: usize, period: Duration) -> Self {
        Self { kind, max_restarts, period }
    }

    pub fn one_for_one() -> Self {
        Self::new(StrategyKind::OneForOne, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_PERIOD)
    }

    pub fn one_for_all() -> Self {
        Self::new(StrategyKind::OneForAll, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_PERIOD)
    }

    pub fn rest_for_one() -> Self {
        Self::new(StrategyKind::RestForOne, DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_PERIOD)
    }

    pub fn with_intensity(mut self, max_restarts: usize, period: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.period = period;
        self
    }
}

/// Sliding record of recent restarts, bounded to `max_restarts` entries.
#[derive(Debug, Clone)]
pub struct RestartWindow {
    history: VecDeque<Instant>,
    capacity: usize,
    period: Duration,
}

impl RestartWindow {
    pub fn new(strategy: &Strategy) -> Self {
        Self {
            history: VecDeque::with_capacity(strategy.max_restarts),
            capacity: strategy.max_restarts,
            period: strategy.period,
        }
    }

    /// Records a restart at `now`. Returns `false` when the window is full
    /// and its oldest entry is still within the period, i.e. intensity is
    /// exhausted; nothing is recorded in that case.
    pub fn admit(&mut self, now: Instant) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.history.len() >= self.capacity {
            if let Some(oldest) = self.history.front() {
                if now.saturating_duration_since(*oldest) < self.period {
                    return false;
                }
            }
            self.history.pop_front();
        }
        self.history.push_back(now);
        true
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
