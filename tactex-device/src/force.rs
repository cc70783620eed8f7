use std::fmt;
use std::time::Duration;

use tactex_timing::{Deadline, HighPrecisionTimer, Timer};
use tracing::{debug, warn};

use crate::numeric::first_number;
use crate::source::{LineEvent, LineSource};

/// How a sampling window aggregates readings and reacts to bad data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePolicy {
    /// Keep the maximum; any decode error voids the window
    PeakFailFast,
    /// Keep every reading; on failure return what was collected so far
    SeriesBestEffort,
}

/// Force data captured during one tap
#[derive(Debug, Clone, PartialEq)]
pub enum ForceReading {
    Peak(f64),
    Series(Vec<f64>),
}

impl fmt::Display for ForceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForceReading::Peak(v) => write!(f, "{v}"),
            ForceReading::Series(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, "]")
            }
        }
    }
}

pub struct ForceSampler<T: Timer = HighPrecisionTimer> {
    source: Option<Box<dyn LineSource>>,
    policy: SamplePolicy,
    poll_interval: Duration,
    timer: T,
}

impl ForceSampler {
    pub fn new(source: Box<dyn LineSource>, policy: SamplePolicy, poll_interval: Duration) -> Self {
        Self::with_timer(source, policy, poll_interval, HighPrecisionTimer::new())
    }

    /// A sampler with no sensor attached; every window yields no data.
    pub fn disconnected(policy: SamplePolicy) -> Self {
        Self::disconnected_with(policy, HighPrecisionTimer::new())
    }
}

impl<T: Timer> ForceSampler<T> {
    /// Windows are measured on `timer`, so they count toward the session's
    /// own clock when it shares that timer.
    pub fn with_timer(
        source: Box<dyn LineSource>,
        policy: SamplePolicy,
        poll_interval: Duration,
        timer: T,
    ) -> Self {
        Self {
            source: Some(source),
            policy,
            poll_interval,
            timer,
        }
    }

    pub fn disconnected_with(policy: SamplePolicy, timer: T) -> Self {
        Self {
            source: None,
            policy,
            poll_interval: Duration::from_millis(50),
            timer,
        }
    }

    pub fn connected(&self) -> bool {
        self.source.is_some()
    }

    pub fn policy(&self) -> SamplePolicy {
        self.policy
    }

    /// Drop sensor lines that arrived before the upcoming tap.
    pub fn clear_input(&mut self) {
        if let Some(source) = self.source.as_mut() {
            let dropped = source.drain();
            if dropped > 0 {
                debug!(dropped, "cleared stale sensor lines");
            }
        }
    }

    /// Read the stream for `window` on the sampler's clock.
    ///
    /// Buffered lines are taken as they come; an empty stream is checked
    /// again after at most the poll interval, never past the window.
    pub fn sample(&mut self, window: Duration) -> Option<ForceReading> {
        let Some(source) = self.source.as_mut() else {
            debug!("force stream not connected; no data for this window");
            return None;
        };

        let deadline = Deadline::after(&self.timer, window);
        let mut peak: Option<f64> = None;
        let mut series = Vec::new();

        while !deadline.expired() {
            match source.poll_line(Duration::ZERO) {
                Ok(LineEvent::Line(line)) => match first_number(&line) {
                    Some(value) => match self.policy {
                        SamplePolicy::PeakFailFast => {
                            peak = Some(peak.map_or(value, |p| p.max(value)));
                        }
                        SamplePolicy::SeriesBestEffort => series.push(value),
                    },
                    None => warn!(line = %line.trim(), "no numeric value in sensor data"),
                },
                Ok(LineEvent::Timeout) => self.timer.sleep(deadline.next_wait(self.poll_interval)),
                Ok(LineEvent::Closed) => {
                    warn!("force stream closed; sensor disconnected");
                    self.source = None;
                    return self.finish_early(series);
                }
                Err(e) => {
                    warn!(error = %e, "error reading force data");
                    return self.finish_early(series);
                }
            }
        }

        match self.policy {
            SamplePolicy::PeakFailFast => peak.map(ForceReading::Peak),
            SamplePolicy::SeriesBestEffort => Some(ForceReading::Series(series)),
        }
    }

    fn finish_early(&self, series: Vec<f64>) -> Option<ForceReading> {
        match self.policy {
            SamplePolicy::PeakFailFast => None,
            SamplePolicy::SeriesBestEffort => Some(ForceReading::Series(series)),
        }
    }
}
