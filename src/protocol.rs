// src/protocol.rs
use crate::config::{PortSettings, ProtocolSettings};
use crate::error::{TenzoError, TenzoResult};
use anyhow::Result;
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::time::Instant;

/// What a single line did to the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum ParseEvent {
    /// Line consumed without producing anything.
    Skipped,
    /// The ready banner arrived after a reset.
    Ready,
    /// The banner never came; the parser gave up waiting and is reading anyway.
    ReadyTimedOut,
    /// A scaled sample.
    Sample(f64),
    /// The line after the sentinel was not a number. Parsing resumes at the next sentinel.
    Malformed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParserState {
    AwaitingReady { since: Instant },
    AwaitingSentinel,
    AwaitingValue,
}

/// Line-level state machine for the board's text output.
///
/// The board prints a `Readings:` banner after reset and then, for each
/// measurement cycle, a `first:` sentinel followed (possibly after blank lines)
/// by the reading of the load cell.
pub struct FrameParser {
    settings: ProtocolSettings,
    state: ParserState,
}

impl FrameParser {
    pub fn new(settings: ProtocolSettings) -> Self {
        Self {
            settings,
            state: ParserState::AwaitingSentinel,
        }
    }

    /// Discard everything until the ready banner shows up.
    pub fn expect_ready(&mut self) {
        self.state = ParserState::AwaitingReady {
            since: Instant::now(),
        };
    }

    /// Gives up on the ready banner once the configured timeout has passed.
    pub fn check_ready_timeout(&mut self, now: Instant) -> Option<ParseEvent> {
        if let ParserState::AwaitingReady { since } = self.state {
            if now.saturating_duration_since(since) >= self.settings.ready_timeout {
                self.state = ParserState::AwaitingSentinel;
                return Some(ParseEvent::ReadyTimedOut);
            }
        }
        None
    }

    pub fn feed(&mut self, raw: &str) -> ParseEvent {
        let line = raw.trim_end_matches(['\r', '\n']);
        match self.state {
            ParserState::AwaitingReady { .. } => {
                if line == self.settings.ready_line {
                    self.state = ParserState::AwaitingSentinel;
                    ParseEvent::Ready
                } else {
                    ParseEvent::Skipped
                }
            }
            ParserState::AwaitingSentinel => {
                if line == self.settings.sample_line {
                    self.state = ParserState::AwaitingValue;
                }
                ParseEvent::Skipped
            }
            ParserState::AwaitingValue => {
                let value = line.trim();
                if value.is_empty() {
                    return ParseEvent::Skipped;
                }
                self.state = ParserState::AwaitingSentinel;
                match value.parse::<f64>() {
                    Ok(v) if v.is_finite() => ParseEvent::Sample(v * self.settings.scale),
                    _ => ParseEvent::Malformed(value.to_owned()),
                }
            }
        }
    }
}

/// Splits a byte stream into lines, surviving read timeouts mid-line.
pub struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::with_capacity(64),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.reader.get_mut()
    }

    /// Returns the next complete line, `None` if the port timed out before one arrived.
    pub fn next_line(&mut self) -> TenzoResult<Option<String>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => {
                if self.pending.is_empty() {
                    Err(TenzoError::Disconnected)
                } else {
                    Ok(Some(self.take_pending()))
                }
            }
            // Without a trailing newline this is EOF mid-line; hand out what we have.
            Ok(_) => Ok(Some(self.take_pending())),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drops buffered input, including a half-received line.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\r', '\n'])
            .to_owned();
        self.pending.clear();
        line
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Byte transport the board talks over: a serial port, or the simulator.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// A connection to the board over any byte transport.
pub struct TenzoSession<T: Read + Write> {
    name: String,
    lines: LineReader<T>,
    parser: FrameParser,
    reset_command: Vec<u8>,
}

impl TenzoSession<Box<dyn Transport>> {
    /// Opens the serial port and starts the reset handshake.
    pub fn connect(port: &PortSettings, protocol: ProtocolSettings) -> Result<Self> {
        let serial: Box<dyn SerialPort> = serialport::new(&port.port_name, port.baud_rate)
            .timeout(port.timeout)
            .open()
            .map_err(TenzoError::from)?;
        if let Err(e) = serial.clear(serialport::ClearBuffer::Input) {
            log::warn!("{}: could not clear input buffer: {e}", port.port_name);
        }
        let mut session = Self::new(port.port_name.clone(), Box::new(serial), protocol);
        session.reset()?;
        Ok(session)
    }
}

impl<T: Read + Write> TenzoSession<T> {
    pub fn new(name: impl Into<String>, transport: T, protocol: ProtocolSettings) -> Self {
        Self {
            name: name.into(),
            lines: LineReader::new(transport),
            reset_command: protocol.reset_command.clone(),
            parser: FrameParser::new(protocol),
        }
    }

    /// Port name (or simulator label) for logging.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends the reset command and waits for the ready banner before taking readings.
    pub fn reset(&mut self) -> TenzoResult<()> {
        self.lines.discard_pending();
        if !self.reset_command.is_empty() {
            let transport = self.lines.get_mut();
            transport.write_all(&self.reset_command)?;
            transport.flush()?;
        }
        self.parser.expect_ready();
        log::debug!("{}: reset sent, waiting for banner", self.name);
        Ok(())
    }

    /// Reads at most one line. `Ok(None)` means the port had nothing for us this time.
    pub fn poll(&mut self) -> TenzoResult<Option<ParseEvent>> {
        if let Some(ev) = self.parser.check_ready_timeout(Instant::now()) {
            return Ok(Some(ev));
        }
        match self.lines.next_line()? {
            Some(line) => {
                log::trace!("{} <- {line:?}", self.name);
                Ok(Some(self.parser.feed(&line)))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;

    /// In-memory stand-in for a serial port.
    pub(crate) struct ScriptedPort {
        input: Cursor<Vec<u8>>,
        pub written: Vec<u8>,
    }

    impl ScriptedPort {
        pub(crate) fn new(text: &str) -> Self {
            Self {
                input: Cursor::new(text.as_bytes().to_vec()),
                written: Vec::new(),
            }
        }
    }

    impl Read for ScriptedPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Yields its chunks one read at a time, timing out in between.
    struct ChoppyPort {
        chunks: Vec<&'static [u8]>,
        next: usize,
        timed_out: bool,
    }

    impl Read for ChoppyPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.timed_out {
                self.timed_out = true;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
            self.timed_out = false;
            match self.chunks.get(self.next) {
                Some(chunk) => {
                    self.next += 1;
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                None => Ok(0),
            }
        }
    }

    fn samples_of(parser: &mut FrameParser, lines: &[&str]) -> Vec<f64> {
        lines
            .iter()
            .filter_map(|l| match parser.feed(l) {
                ParseEvent::Sample(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn sentinel_then_value_is_scaled() {
        let mut parser = FrameParser::new(ProtocolSettings::default());
        let got = samples_of(
            &mut parser,
            &["Readings:", "junk", "first:", "", "12.5", "first:", "7.0"],
        );
        assert_eq!(got, vec![125.0, 70.0]);
    }

    #[test]
    fn lines_without_sentinel_are_ignored() {
        let mut parser = FrameParser::new(ProtocolSettings::default());
        let got = samples_of(&mut parser, &["3.0", "second:", "4.0", "first:\r", "\r", "0.25\r"]);
        assert_eq!(got, vec![2.5]);
    }

    #[test]
    fn malformed_value_resumes_at_next_sentinel() {
        let mut parser = FrameParser::new(ProtocolSettings::default());
        assert_eq!(parser.feed("first:"), ParseEvent::Skipped);
        assert_eq!(parser.feed("ovf"), ParseEvent::Malformed("ovf".to_owned()));
        // a number right after a malformed value is not a sample
        assert_eq!(parser.feed("1.0"), ParseEvent::Skipped);
        assert_eq!(parser.feed("first:"), ParseEvent::Skipped);
        assert_eq!(parser.feed("-1.5"), ParseEvent::Sample(-15.0));
    }

    #[test]
    fn non_finite_values_are_malformed() {
        let mut parser = FrameParser::new(ProtocolSettings::default());
        parser.feed("first:");
        assert!(matches!(parser.feed("NaN"), ParseEvent::Malformed(_)));
        parser.feed("first:");
        assert!(matches!(parser.feed("inf"), ParseEvent::Malformed(_)));
    }

    #[test]
    fn readings_before_banner_are_discarded() {
        let mut parser = FrameParser::new(ProtocolSettings::default());
        parser.expect_ready();
        assert_eq!(parser.feed("first:"), ParseEvent::Skipped);
        assert_eq!(parser.feed("9.0"), ParseEvent::Skipped);
        assert_eq!(parser.feed("Readings:"), ParseEvent::Ready);
        let got = samples_of(&mut parser, &["first:", "9.0"]);
        assert_eq!(got, vec![90.0]);
    }

    #[test]
    fn ready_timeout_falls_through_to_reading() {
        let settings = ProtocolSettings {
            ready_timeout: Duration::from_millis(0),
            ..ProtocolSettings::default()
        };
        let mut parser = FrameParser::new(settings);
        parser.expect_ready();
        assert_eq!(
            parser.check_ready_timeout(Instant::now()),
            Some(ParseEvent::ReadyTimedOut)
        );
        assert_eq!(parser.check_ready_timeout(Instant::now()), None);
        assert_eq!(parser.feed("first:"), ParseEvent::Skipped);
        assert_eq!(parser.feed("1"), ParseEvent::Sample(10.0));
    }

    #[test]
    fn line_reader_survives_timeouts_mid_line() {
        let port = ChoppyPort {
            chunks: vec![b"fir", b"st:\r\n12", b".5\r\n"],
            next: 0,
            timed_out: false,
        };
        let mut lines = LineReader::new(port);
        let mut got = Vec::new();
        loop {
            match lines.next_line() {
                Ok(Some(l)) => got.push(l),
                Ok(None) => continue,
                Err(TenzoError::Disconnected) => break,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(got, vec!["first:".to_owned(), "12.5".to_owned()]);
    }

    #[test]
    fn session_writes_reset_and_waits_for_banner() {
        let port = ScriptedPort::new("garbage\nfirst:\n1.0\nReadings:\nfirst:\n\n2.0\n");
        let mut session = TenzoSession::new("test", port, ProtocolSettings::default());
        session.reset().unwrap();

        let mut events = Vec::new();
        loop {
            match session.poll() {
                Ok(Some(ParseEvent::Skipped)) | Ok(None) => {}
                Ok(Some(ev)) => events.push(ev),
                Err(TenzoError::Disconnected) => break,
                Err(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(events, vec![ParseEvent::Ready, ParseEvent::Sample(20.0)]);
        assert_eq!(session.lines.get_mut().written, b"r\n".to_vec());
    }
}
