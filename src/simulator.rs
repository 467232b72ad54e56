// src/simulator.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

/// Stand-in for the tribometer board when no hardware is attached.
///
/// Behaves like the serial port from the reader's point of view: it prints the
/// `Readings:` banner after boot or after any write (the reset command), then
/// repeats the two-sensor reading cycle, one line per `line_period`.
pub struct SimulatedTenzo {
    line_period: Duration,
    next_line_at: Instant,
    started: Instant,
    lines: VecDeque<String>,
    out: VecDeque<u8>,
    rng: StdRng,
}

impl SimulatedTenzo {
    pub fn new(line_period: Duration) -> Self {
        Self::with_rng(line_period, StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn with_seed(line_period: Duration, seed: u64) -> Self {
        Self::with_rng(line_period, StdRng::seed_from_u64(seed))
    }

    fn with_rng(line_period: Duration, rng: StdRng) -> Self {
        let now = Instant::now();
        let mut sim = Self {
            line_period,
            next_line_at: now,
            started: now,
            lines: VecDeque::new(),
            out: VecDeque::new(),
            rng,
        };
        sim.boot();
        sim
    }

    fn boot(&mut self) {
        self.lines.clear();
        self.out.clear();
        self.started = Instant::now();
        self.lines.push_back("HX711 tenzo".to_owned());
        self.lines.push_back("Readings:".to_owned());
    }

    /// Raw (unscaled) reading: the load settles towards ~15 with a slow wobble and noise.
    fn load_at(&mut self, t: f64) -> f64 {
        let settle = 15.0 * (1.0 - (-t / 4.0).exp());
        let wobble = 0.6 * (t * 1.3).sin();
        settle + wobble + self.rng.gen_range(-0.15..0.15)
    }

    fn queue_cycle(&mut self) {
        let t = self.started.elapsed().as_secs_f64();
        let first = self.load_at(t);
        let second = first * 0.4 + self.rng.gen_range(-0.1..0.1);
        self.lines.push_back("first:".to_owned());
        self.lines.push_back(String::new());
        self.lines.push_back(format!("{first:.2}"));
        self.lines.push_back("second:".to_owned());
        self.lines.push_back(format!("{second:.2}"));
    }

    fn emit_next_line(&mut self) {
        if self.lines.is_empty() {
            self.queue_cycle();
        }
        if let Some(line) = self.lines.pop_front() {
            self.out.extend(line.bytes());
            self.out.extend(b"\r\n");
        }
        self.next_line_at += self.line_period;
        // Don't burst to catch up after the reader stalled.
        let now = Instant::now();
        if self.next_line_at < now {
            self.next_line_at = now;
        }
    }
}

impl Read for SimulatedTenzo {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.out.is_empty() {
            let now = Instant::now();
            if self.next_line_at > now {
                thread::sleep(self.next_line_at - now);
            }
            self.emit_next_line();
        }
        let n = buf.len().min(self.out.len());
        for (dst, src) in buf.iter_mut().zip(self.out.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for SimulatedTenzo {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !buf.is_empty() {
            self.boot();
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolSettings;
    use crate::protocol::{ParseEvent, TenzoSession};

    fn collect_events(session: &mut TenzoSession<SimulatedTenzo>, samples: usize) -> Vec<ParseEvent> {
        let mut events = Vec::new();
        while events.iter().filter(|e| matches!(e, ParseEvent::Sample(_))).count() < samples {
            match session.poll().unwrap() {
                Some(ParseEvent::Skipped) | None => {}
                Some(ev) => events.push(ev),
            }
        }
        events
    }

    #[test]
    fn banner_comes_before_samples() {
        let sim = SimulatedTenzo::with_seed(Duration::from_millis(0), 7);
        let mut session = TenzoSession::new("sim", sim, ProtocolSettings::default());
        session.reset().unwrap();
        let events = collect_events(&mut session, 3);
        assert_eq!(events[0], ParseEvent::Ready);
        assert_eq!(events.len(), 4);
        for ev in &events[1..] {
            match ev {
                ParseEvent::Sample(v) => assert!((-10.0..200.0).contains(v), "odd value {v}"),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn write_restarts_the_banner() {
        let mut sim = SimulatedTenzo::with_seed(Duration::from_millis(0), 1);
        let mut buf = [0u8; 256];
        // consume the boot banner and part of a cycle
        for _ in 0..4 {
            sim.read(&mut buf).unwrap();
        }
        sim.write_all(b"r\n").unwrap();
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"HX711 tenzo\r\n");
        let n = sim.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Readings:\r\n");
    }
}
