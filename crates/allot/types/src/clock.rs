//! Time source injected into everything that evaluates expiration.

use chrono::{DateTime, Utc};
use std::sync::RwLock;

/// Supplies the current instant.
pub trait DateSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDateSource;

impl DateSource for SystemDateSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and offline evaluation.
#[derive(Debug)]
pub struct FixedDateSource {
    now: RwLock<DateTime<Utc>>,
}

impl FixedDateSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.write() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }
}

impl DateSource for FixedDateSource {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
