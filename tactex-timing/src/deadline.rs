use std::time::Duration;

use crate::Timer;

/// A window on a [`Timer`]'s clock that polling loops check against
#[derive(Clone)]
pub struct Deadline<T: Timer> {
    timer: T,
    start: T::Timestamp,
    window: Duration,
}

impl<T: Timer> Deadline<T> {
    pub fn after(timer: &T, window: Duration) -> Self {
        Self {
            timer: timer.clone(),
            start: timer.now(),
            window,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.window.saturating_sub(self.timer.elapsed(self.start))
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Wait for at most `poll`, never past the end of the window.
    pub fn next_wait(&self, poll: Duration) -> Duration {
        poll.min(self.remaining())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HighPrecisionTimer, SimulatedTimer};

    #[test]
    fn zero_window_is_already_expired() {
        let deadline = Deadline::after(&HighPrecisionTimer::new(), Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.next_wait(Duration::from_millis(50)), Duration::ZERO);
    }

    #[test]
    fn waits_are_capped_by_the_window() {
        let deadline = Deadline::after(&HighPrecisionTimer::new(), Duration::from_secs(60));
        assert!(!deadline.expired());
        assert_eq!(
            deadline.next_wait(Duration::from_millis(50)),
            Duration::from_millis(50)
        );
        assert!(deadline.next_wait(Duration::from_secs(120)) <= Duration::from_secs(60));
    }

    #[test]
    fn follows_the_timer_clock() {
        let timer = SimulatedTimer::new();
        let deadline = Deadline::after(&timer, Duration::from_millis(100));
        timer.advance(Duration::from_millis(70));
        assert_eq!(deadline.remaining(), Duration::from_millis(30));
        assert_eq!(
            deadline.next_wait(Duration::from_millis(50)),
            Duration::from_millis(30)
        );
        timer.sleep(Duration::from_millis(30));
        assert!(deadline.expired());
    }
}
