//! IdGenerator port.
//!
//! ULIDs sort by creation time. `UlidGenerator` takes the timestamp part from
//! an injected `Clock`, so ids minted under a `FixedClock` share a timestamp.

use ulid::Ulid;

use crate::domain::ids::{StateId, TaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;

    fn generate_state_id(&self) -> StateId;
}

pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn generate_state_id(&self) -> StateId {
        StateId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn generated_ids_are_unique() {
        let id_gen = UlidGenerator::new(SystemClock);
        let a = id_gen.generate_task_id();
        let b = id_gen.generate_task_id();
        assert_ne!(a, b);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let task = id_gen.generate_task_id();
        let state = id_gen.generate_state_id();

        assert_eq!(task.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(state.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert!(state.to_string().starts_with("state-"));
    }
}
