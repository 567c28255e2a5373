//! Run phases of a crawl
//!
//! A run moves strictly forward through `Idle -> Seeding -> Crawling ->
//! Draining -> Compiled`. A failed probe may jump from `Seeding` straight to
//! `Compiled`, which ends the run without crawling.

use crate::ValidatorError;
use parking_lot::Mutex;
use std::fmt;

/// The phase a crawl run is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Engine built, nothing started
    Idle,

    /// Probing the seed and starting the first walker
    Seeding,

    /// Walkers and validation workers running
    Crawling,

    /// Every walker finished; workers emptying the queue
    Draining,

    /// Report compiled, run over
    Compiled,
}

impl CrawlPhase {
    /// Returns true if the run can move from this phase to `next`
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Seeding)
                | (Self::Seeding, Self::Crawling)
                | (Self::Seeding, Self::Compiled)
                | (Self::Crawling, Self::Draining)
                | (Self::Draining, Self::Compiled)
        )
    }

    /// Returns true once no further work will be accepted
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Compiled)
    }

    /// Returns true while producers may still add work
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Seeding | Self::Crawling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Seeding => "seeding",
            Self::Crawling => "crawling",
            Self::Draining => "draining",
            Self::Compiled => "compiled",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared holder of the current phase that rejects illegal transitions
#[derive(Debug)]
pub struct PhaseTracker {
    current: Mutex<CrawlPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self {
            current: Mutex::new(CrawlPhase::Idle),
        }
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> CrawlPhase {
        *self.current.lock()
    }

    /// Moves to `next`, or fails with `InvalidTransition`
    pub fn advance(&self, next: CrawlPhase) -> Result<(), ValidatorError> {
        let mut current = self.current.lock();
        if !current.can_transition_to(next) {
            return Err(ValidatorError::InvalidTransition {
                from: *current,
                to: next,
            });
        }
        tracing::debug!("Crawl phase {} -> {}", *current, next);
        *current = next;
        Ok(())
    }
}
