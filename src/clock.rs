//! Monotonic identifier minting and day-boundary arithmetic.
//!
//! Card, note, media and revlog ids are minted from the current wall clock in
//! milliseconds; ids must stay strictly increasing even across process
//! restarts (the revlog invariant in particular depends on it), so
//! [`IdGenerator`] is seeded from the highest id already present in the store
//! on load rather than always trusting the clock.

use chrono::{DateTime, TimeZone, Utc};

/// Default hour (0-23) at which a new scheduling day begins.
pub const DEFAULT_ROLLOVER_HOUR: u32 = 4;

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Monotonic id source. One instance is owned by the `Store`; every mutation
/// that mints a new entity id goes through it.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Raises the floor so that newly minted ids never collide with ids
    /// recovered from a snapshot or archive import.
    pub fn seed_from_max(&mut self, max_existing_id: i64) {
        if max_existing_id > self.last {
            self.last = max_existing_id;
        }
    }

    /// Mints the next id, using `now_millis` when it has advanced past the
    /// last minted id, otherwise incrementing by one.
    pub fn next(&mut self, now_millis: i64) -> i64 {
        self.last = if now_millis > self.last {
            now_millis
        } else {
            self.last + 1
        };
        self.last
    }
}

/// Returns the epoch-seconds boundary of the scheduling day that contains
/// `at`, given a rollover hour. Timestamps before the rollover hour on a
/// calendar day belong to the previous scheduling day.
pub fn day_cutoff_secs(at: DateTime<Utc>, rollover_hour: u32) -> i64 {
    let date = at.date_naive();
    let boundary = Utc
        .from_utc_datetime(&date.and_hms_opt(rollover_hour, 0, 0).unwrap_or_default());
    if at < boundary {
        (boundary - chrono::Duration::days(1)).timestamp()
    } else {
        boundary.timestamp()
    }
}

/// Days elapsed between the collection's creation instant and `at`, measured
/// in scheduling days (i.e. respecting the rollover hour). Used both to
/// stamp `Card::due` for Review cards and to gate daily limits.
pub fn day_index(at: DateTime<Utc>, crt_secs: i64, rollover_hour: u32) -> i64 {
    let crt = Utc.timestamp_opt(crt_secs, 0).single().unwrap_or(at);
    let now_cutoff = day_cutoff_secs(at, rollover_hour);
    let crt_cutoff = day_cutoff_secs(crt, rollover_hour);
    (now_cutoff - crt_cutoff) / 86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_advances_with_clock() {
        let mut r#gen = IdGenerator::new();
        assert_eq!(r#gen.next(1_000), 1_000);
        assert_eq!(r#gen.next(1_000), 1_001);
        assert_eq!(r#gen.next(999), 1_002);
        assert_eq!(r#gen.next(5_000), 5_000);
    }

    #[test]
    fn seed_from_max_raises_floor() {
        let mut r#gen = IdGenerator::new();
        r#gen.seed_from_max(10_000);
        assert_eq!(r#gen.next(1), 10_001);
    }

    #[test]
    fn day_index_respects_rollover() {
        let crt = Utc.with_ymd_and_hms(2024, 1, 1, 4, 0, 0).unwrap().timestamp();
        let before_rollover = Utc.with_ymd_and_hms(2024, 1, 2, 3, 59, 0).unwrap();
        let after_rollover = Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap();
        assert_eq!(day_index(before_rollover, crt, 4), 0);
        assert_eq!(day_index(after_rollover, crt, 4), 1);
    }
}
