// src/types.rs
use crate::config::{PortSettings, ProtocolSettings};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

/// One scaled load reading, stamped when the reader thread parsed it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub received_at: Instant,
}

impl Sample {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            received_at: Instant::now(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect {
        mode: ConnectionMode,
        port: PortSettings,
        protocol: ProtocolSettings,
        /// Line pacing of the simulated board.
        sim_line_period: Duration,
    },
    Disconnect,
    /// Re-sends the reset command and waits for the ready banner again.
    ResetDevice,
    /// Start or stop queueing samples. Outside a run the port is still read and readings are dropped.
    Capture(bool),
    Shutdown,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TenzoMessage {
    Log(String),
    /// Connection state of the reader thread.
    Status(bool),
    /// The device printed its ready banner after a reset.
    DeviceReady,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ru")]
    Russian,
}
