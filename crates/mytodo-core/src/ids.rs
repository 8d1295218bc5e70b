use std::cell::Cell;

use chrono::Utc;
use tracing::trace;

use crate::task::Task;

/// Hands out task ids seeded from wall-clock milliseconds.
///
/// Ids never repeat within a generator and always exceed every id already
/// present in the collection they are drawn for, so a burst of imports inside
/// one millisecond still yields distinct values.
#[derive(Debug)]
pub struct IdGenerator {
    last: Cell<u64>,
    clock: fn() -> u64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::with_clock(now_millis)
    }
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: fn() -> u64) -> Self {
        Self {
            last: Cell::new(0),
            clock,
        }
    }

    pub fn next_for(&self, existing: &[Task]) -> u64 {
        let highest = existing.iter().map(|t| t.id).max().unwrap_or(0);
        let floor = self.last.get().max(highest);
        let id = (self.clock)().max(floor.saturating_add(1));
        self.last.set(id);
        trace!(id, "generated task id");
        id
    }
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}
