//! Wall clock abstraction.
//!
//! RULE: Nothing in the engine calls `Utc::now()` directly.
//! All timestamps flow through a Clock so tests can pin time.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;

    /// A boxed copy for a forked engine.
    fn boxed_clone(&self) -> Box<dyn Clock>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn boxed_clone(&self) -> Box<dyn Clock> {
        Box::new(*self)
    }
}

/// Test clock. Clones share the same instant, so advancing one
/// advances every engine forked from it.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn boxed_clone(&self) -> Box<dyn Clock> {
        Box::new(self.clone())
    }
}
