// src/acquisition.rs
use crate::queue::SampleReceiver;
use std::time::{Duration, Instant};

/// Fixed-period tick, driven by whoever calls [`Ticker::due`] with the current time.
#[derive(Clone, Debug)]
pub struct Ticker {
    period: Duration,
    last: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// True at most once per period. The first call after a reset fires immediately.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn until_next(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.period.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// The plotted history: two parallel sequences.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Series {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, t: f64, v: f64) {
        self.times.push(t);
        self.values.push(v);
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.values.clear();
    }

    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.times.iter().zip(&self.values).map(|(t, v)| [*t, *v])
    }

    pub fn time_span(&self) -> f64 {
        self.times.last().copied().unwrap_or(0.0)
    }
}

/// Summary shown in the readings table.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Readings {
    pub current: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub count: usize,
    sum: f64,
}

impl Readings {
    pub fn record(&mut self, v: f64) {
        self.current = Some(v);
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.count += 1;
        self.sum += v;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// Stopped by the user or by the duration timer; history is kept for export.
    Finished,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No run in progress, the queue is left alone.
    Idle,
    /// Period hasn't elapsed yet.
    NotDue,
    /// Tick fired, nothing was queued.
    Empty,
    /// Tick fired and popped a sample from before the run started.
    Stale,
    Appended,
    /// The run's duration elapsed on this call.
    Expired,
}

/// Collects samples for one test run.
pub struct Acquisition {
    series: Series,
    readings: Readings,
    ticker: Ticker,
    state: RunState,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
}

impl Acquisition {
    pub fn new(tick_period: Duration) -> Self {
        Self {
            series: Series::default(),
            readings: Readings::default(),
            ticker: Ticker::new(tick_period),
            state: RunState::Idle,
            started_at: None,
            deadline: None,
        }
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    /// Clears the history and starts a run. `duration` of `None` runs until [`stop`](Self::stop).
    pub fn start(&mut self, now: Instant, duration: Option<Duration>) {
        self.series.clear();
        self.readings = Readings::default();
        self.ticker.reset();
        self.state = RunState::Running;
        self.started_at = Some(now);
        self.deadline = duration.map(|d| now + d);
        log::info!("run started (duration {duration:?})");
    }

    pub fn stop(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Finished;
            self.deadline = None;
            log::info!("run stopped with {} samples", self.series.len());
        }
    }

    /// Seconds since the run started.
    pub fn elapsed(&self, now: Instant) -> f64 {
        self.started_at
            .map(|t| now.saturating_duration_since(t).as_secs_f64())
            .unwrap_or(0.0)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.state {
            RunState::Running => self.deadline.map(|d| d.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// How long the UI may sleep before the next tick or the deadline needs it.
    pub fn time_to_next_tick(&self, now: Instant) -> Option<Duration> {
        if !self.is_running() {
            return None;
        }
        let tick = self.ticker.until_next(now);
        Some(match self.remaining(now) {
            Some(left) => tick.min(left),
            None => tick,
        })
    }

    /// One UI tick: at most one non-blocking pop, appended to the history.
    pub fn tick(&mut self, queue: &SampleReceiver, now: Instant) -> TickOutcome {
        if self.state != RunState::Running {
            return TickOutcome::Idle;
        }
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.state = RunState::Finished;
                self.deadline = None;
                log::info!("run finished after {:.1} s", self.elapsed(now));
                return TickOutcome::Expired;
            }
        }
        if !self.ticker.due(now) {
            return TickOutcome::NotDue;
        }
        let Some(sample) = queue.try_pop() else {
            return TickOutcome::Empty;
        };
        let Some(started) = self.started_at else {
            return TickOutcome::Stale;
        };
        if sample.received_at < started {
            return TickOutcome::Stale;
        }
        let t = sample.received_at.saturating_duration_since(started).as_secs_f64();
        self.series.push(t, sample.value);
        self.readings.record(sample.value);
        TickOutcome::Appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::sample_queue;
    use crate::types::Sample;

    const TICK: Duration = Duration::from_millis(100);
    const SHORT: Duration = Duration::from_millis(5);

    fn sample_at(value: f64, at: Instant) -> Sample {
        Sample {
            value,
            received_at: at,
        }
    }

    #[test]
    fn empty_queue_leaves_series_untouched() {
        let (_tx, rx) = sample_queue(4);
        let t0 = Instant::now();
        let mut acq = Acquisition::new(TICK);
        acq.start(t0, None);
        assert_eq!(acq.tick(&rx, t0), TickOutcome::Empty);
        assert_eq!(acq.tick(&rx, t0 + TICK), TickOutcome::Empty);
        assert!(acq.series().is_empty());
        assert_eq!(acq.readings().count, 0);
    }

    #[test]
    fn one_sample_per_tick() {
        let (tx, rx) = sample_queue(4);
        let t0 = Instant::now();
        let mut acq = Acquisition::new(TICK);
        acq.start(t0, None);
        tx.push_timeout(sample_at(5.0, t0 + Duration::from_millis(10)), SHORT).unwrap();
        tx.push_timeout(sample_at(7.0, t0 + Duration::from_millis(20)), SHORT).unwrap();

        assert_eq!(acq.tick(&rx, t0), TickOutcome::Appended);
        assert_eq!(acq.tick(&rx, t0 + Duration::from_millis(50)), TickOutcome::NotDue);
        assert_eq!(acq.series().len(), 1);
        assert_eq!(acq.tick(&rx, t0 + TICK), TickOutcome::Appended);

        assert_eq!(acq.series().values, vec![5.0, 7.0]);
        assert!((acq.series().times[1] - 0.02).abs() < 1e-9);
        let r = acq.readings();
        assert_eq!(r.current, Some(7.0));
        assert_eq!(r.max, Some(7.0));
        assert_eq!(r.min, Some(5.0));
        assert_eq!(r.mean(), Some(6.0));
    }

    #[test]
    fn nothing_appended_after_duration_elapses() {
        let (tx, rx) = sample_queue(8);
        let t0 = Instant::now();
        let mut acq = Acquisition::new(TICK);
        acq.start(t0, Some(Duration::from_secs(1)));
        tx.push_timeout(sample_at(1.0, t0), SHORT).unwrap();
        assert_eq!(acq.tick(&rx, t0), TickOutcome::Appended);
        assert_eq!(acq.remaining(t0 + Duration::from_millis(400)), Some(Duration::from_millis(600)));

        let after = t0 + Duration::from_secs(1);
        for v in [2.0, 3.0, 4.0] {
            tx.push_timeout(sample_at(v, t0 + Duration::from_millis(500)), SHORT).unwrap();
        }
        assert_eq!(acq.tick(&rx, after), TickOutcome::Expired);
        assert_eq!(acq.state(), RunState::Finished);
        for i in 1..5 {
            assert_eq!(acq.tick(&rx, after + TICK * i), TickOutcome::Idle);
        }
        assert_eq!(acq.series().values, vec![1.0]);
        // the queue is left unread
        assert_eq!(rx.len(), 3);
        assert_eq!(acq.remaining(after), None);
    }

    #[test]
    fn samples_from_before_the_run_are_skipped() {
        let (tx, rx) = sample_queue(4);
        let before = Instant::now();
        let t0 = before + Duration::from_secs(2);
        let mut acq = Acquisition::new(TICK);
        acq.start(t0, None);
        tx.push_timeout(sample_at(9.0, before), SHORT).unwrap();
        assert_eq!(acq.tick(&rx, t0), TickOutcome::Stale);
        assert!(acq.series().is_empty());
    }

    #[test]
    fn restart_clears_history_and_stop_keeps_it() {
        let (tx, rx) = sample_queue(4);
        let t0 = Instant::now();
        let mut acq = Acquisition::new(TICK);
        assert_eq!(acq.tick(&rx, t0), TickOutcome::Idle);

        acq.start(t0, None);
        tx.push_timeout(sample_at(3.0, t0), SHORT).unwrap();
        acq.tick(&rx, t0);
        acq.stop();
        assert_eq!(acq.state(), RunState::Finished);
        assert_eq!(acq.series().len(), 1);

        let t1 = t0 + Duration::from_secs(5);
        acq.start(t1, None);
        assert!(acq.series().is_empty());
        assert_eq!(acq.readings().count, 0);
        assert!(acq.is_running());
    }

    #[test]
    fn next_tick_never_overshoots_the_deadline() {
        let (_tx, rx) = sample_queue(1);
        let t0 = Instant::now();
        let mut acq = Acquisition::new(TICK);
        assert_eq!(acq.time_to_next_tick(t0), None);
        acq.start(t0, Some(Duration::from_millis(130)));
        acq.tick(&rx, t0);
        assert_eq!(acq.time_to_next_tick(t0), Some(TICK));
        assert_eq!(
            acq.time_to_next_tick(t0 + Duration::from_millis(50)),
            Some(Duration::from_millis(50))
        );
        // tick overdue
        assert_eq!(
            acq.time_to_next_tick(t0 + Duration::from_millis(110)),
            Some(Duration::ZERO)
        );
        acq.tick(&rx, t0 + Duration::from_millis(110));
        // deadline closer than the next tick
        assert_eq!(
            acq.time_to_next_tick(t0 + Duration::from_millis(120)),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn ticker_fires_once_per_period() {
        let t0 = Instant::now();
        let mut ticker = Ticker::new(TICK);
        assert!(ticker.due(t0));
        assert!(!ticker.due(t0 + Duration::from_millis(99)));
        assert!(ticker.due(t0 + TICK));
        assert_eq!(ticker.until_next(t0 + TICK + Duration::from_millis(30)), Duration::from_millis(70));
        ticker.reset();
        assert!(ticker.due(t0));
    }
}
