// src/engine.rs
use crate::protocol::{ParseEvent, TenzoSession, Transport};
use crate::queue::{PushError, SampleSender};
use crate::simulator::SimulatedTenzo;
use crate::types::*;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Link = TenzoSession<Box<dyn Transport>>;

/// How long one blocking push may wait before the loop goes back to check commands.
const PUSH_SLICE: Duration = Duration::from_millis(20);
const IDLE_SLEEP: Duration = Duration::from_millis(20);

/// The reader thread: owns the device link and is the only producer of samples.
struct Engine {
    tx: Sender<TenzoMessage>,
    samples: SampleSender,
    link: Option<Link>,
    /// Parsed but not yet queued; retried until the consumer makes room.
    pending: Option<Sample>,
    backpressured: bool,
    /// Samples are queued only while a run is capturing.
    capturing: bool,
}

enum Step {
    Continue,
    Exit,
}

impl Engine {
    fn new(tx: Sender<TenzoMessage>, samples: SampleSender) -> Self {
        Self {
            tx,
            samples,
            link: None,
            pending: None,
            backpressured: false,
            capturing: false,
        }
    }

    fn log(&self, msg: String) {
        log::info!("{msg}");
        self.tx.send(TenzoMessage::Log(msg)).ok();
    }

    fn run(mut self, rx_cmd: Receiver<GuiCommand>) {
        self.log("Reader thread started".to_owned());
        loop {
            loop {
                match rx_cmd.try_recv() {
                    Ok(cmd) => {
                        if let Step::Exit = self.handle(cmd) {
                            self.close("shutdown");
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.close("UI gone");
                        return;
                    }
                }
            }
            if let Step::Exit = self.step() {
                self.close("sample consumer gone");
                return;
            }
        }
    }

    fn handle(&mut self, cmd: GuiCommand) -> Step {
        match cmd {
            GuiCommand::Connect {
                mode,
                port,
                protocol,
                sim_line_period,
            } => {
                self.close("reconnect");
                let opened = match mode {
                    ConnectionMode::Hardware => Link::connect(&port, protocol),
                    ConnectionMode::Simulation => {
                        let sim: Box<dyn Transport> =
                            Box::new(SimulatedTenzo::new(sim_line_period));
                        let mut link = Link::new("simulator", sim, protocol);
                        link.reset().map(|_| link).map_err(anyhow::Error::from)
                    }
                };
                match opened {
                    Ok(link) => {
                        self.log(format!("✅ Connected to {}, waiting for device...", link.name()));
                        self.link = Some(link);
                        self.tx.send(TenzoMessage::Status(true)).ok();
                    }
                    Err(e) => {
                        log::error!("connect to {} failed: {e:#}", port.port_name);
                        self.tx
                            .send(TenzoMessage::Log(format!("❌ Failed: {e:#}")))
                            .ok();
                        self.tx.send(TenzoMessage::Status(false)).ok();
                    }
                }
            }
            GuiCommand::Disconnect => self.close("disconnect requested"),
            GuiCommand::ResetDevice => {
                let result = self.link.as_mut().map(|link| link.reset());
                match result {
                    Some(Ok(())) => self.log("🔄 Reset sent".to_owned()),
                    Some(Err(e)) => self.fail(e.to_string()),
                    None => self.log("Not connected.".to_owned()),
                }
            }
            GuiCommand::Capture(on) => {
                log::debug!("capture {}", if on { "on" } else { "off" });
                self.capturing = on;
                if !on {
                    self.pending = None;
                    self.backpressured = false;
                }
            }
            GuiCommand::Shutdown => return Step::Exit,
        }
        Step::Continue
    }

    /// One unit of work: retry a pending push, or read one line from the device.
    fn step(&mut self) -> Step {
        if let Some(sample) = self.pending.take() {
            match self.samples.push_timeout(sample, PUSH_SLICE) {
                Ok(()) => {
                    if self.backpressured {
                        log::debug!("queue drained, resuming reads");
                        self.backpressured = false;
                    }
                }
                Err(PushError::Full(sample)) => {
                    if !self.backpressured {
                        log::debug!(
                            "queue full ({}/{}), holding sample",
                            self.samples.len(),
                            self.samples.capacity()
                        );
                        self.backpressured = true;
                    }
                    self.pending = Some(sample);
                    return Step::Continue;
                }
                Err(PushError::Closed(_)) => return Step::Exit,
            }
        }

        let Some(link) = self.link.as_mut() else {
            thread::sleep(IDLE_SLEEP);
            return Step::Continue;
        };
        match link.poll() {
            Ok(None) | Ok(Some(ParseEvent::Skipped)) => {}
            Ok(Some(ParseEvent::Ready)) => {
                self.tx.send(TenzoMessage::DeviceReady).ok();
                self.log("📡 Device ready, reading".to_owned());
            }
            Ok(Some(ParseEvent::ReadyTimedOut)) => {
                log::warn!("no ready banner from device, reading anyway");
                self.tx.send(TenzoMessage::DeviceReady).ok();
                self.tx
                    .send(TenzoMessage::Log("⚠️ No ready banner, reading anyway".to_owned()))
                    .ok();
            }
            Ok(Some(ParseEvent::Sample(value))) if self.capturing => {
                self.pending = Some(Sample::new(value));
            }
            Ok(Some(ParseEvent::Sample(value))) => {
                log::trace!("no run in progress, dropping {value}");
            }
            Ok(Some(ParseEvent::Malformed(raw))) => {
                log::warn!("discarding malformed sample {raw:?}");
                self.tx
                    .send(TenzoMessage::Log(format!("⚠️ Bad reading {raw:?} skipped")))
                    .ok();
            }
            Err(e) => self.fail(e.to_string()),
        }
        Step::Continue
    }

    fn fail(&mut self, reason: String) {
        log::error!("device link failed: {reason}");
        self.link = None;
        self.tx.send(TenzoMessage::Log(format!("❌ {reason}"))).ok();
        self.tx.send(TenzoMessage::Status(false)).ok();
    }

    fn close(&mut self, why: &str) {
        if let Some(link) = self.link.take() {
            log::info!("closing {} ({why})", link.name());
            self.tx.send(TenzoMessage::Status(false)).ok();
        }
    }
}

/// Starts the reader thread. Samples go to `samples`, everything else to `tx`.
pub fn spawn_thread(
    tx: Sender<TenzoMessage>,
    rx_cmd: Receiver<GuiCommand>,
    samples: SampleSender,
) -> JoinHandle<()> {
    thread::spawn(move || Engine::new(tx, samples).run(rx_cmd))
}
