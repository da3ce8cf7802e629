//! Fixed-interval cycle cadence.

use std::time::Duration;

use tokio::time::Instant;

/// Deadline for the cycle after one scheduled at `scheduled`.
///
/// An overrun runs the next cycle immediately instead of skipping ahead or
/// drifting by the overrun.
pub(crate) fn next_deadline(scheduled: Instant, period: Duration, now: Instant) -> Instant {
    let due = scheduled + period;
    if due > now {
        due
    } else {
        now
    }
}

/// Pause before the 1-based `index`-th target of a cycle: nothing before the
/// first, then alternating one and two `base` delays.
pub(crate) fn inter_target_delay(index: usize, base: Duration) -> Duration {
    if index <= 1 {
        Duration::ZERO
    } else if index % 2 == 1 {
        base * 2
    } else {
        base
    }
}

/// Waits for cycle start times. The first tick is immediate.
pub(crate) struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now(),
        }
    }

    pub(crate) async fn wait(&self) {
        tokio::time::sleep_until(self.next).await;
    }

    /// Schedules the next tick relative to the start of the cycle that just ended.
    pub(crate) fn cycle_finished(&mut self) {
        self.next = next_deadline(self.next, self.period, Instant::now());
        tracing::debug!(
            wait_ms = self.next.saturating_duration_since(Instant::now()).as_millis(),
            "next cycle scheduled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_catches_up_immediately() {
        let start = Instant::now();
        let period = Duration::from_secs(30);

        assert_eq!(
            next_deadline(start, period, start + Duration::from_secs(10)),
            start + period
        );
        let late = start + Duration::from_secs(45);
        assert_eq!(next_deadline(start, period, late), late);
    }

    #[test]
    fn delay_alternates_after_first_target() {
        let base = Duration::from_millis(1000);
        let delays: Vec<u64> = (1..=5)
            .map(|i| u64::try_from(inter_target_delay(i, base).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![0, 1000, 2000, 1000, 2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_keeps_fixed_cadence() {
        let origin = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(30));

        ticker.wait().await;
        assert_eq!(origin.elapsed(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(12)).await;
        ticker.cycle_finished();
        ticker.wait().await;
        assert_eq!(origin.elapsed(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(40)).await;
        ticker.cycle_finished();
        ticker.wait().await;
        assert_eq!(origin.elapsed(), Duration::from_secs(70));
    }
}
