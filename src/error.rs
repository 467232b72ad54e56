// src/error.rs
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TenzoError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The device closed the stream (cable pulled, board reset into bootloader, ...).
    #[error("device disconnected")]
    Disconnected,

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("image export failed: {0}")]
    Render(String),

    #[error("nothing to export")]
    NothingToExport,
}

pub type TenzoResult<T> = std::result::Result<T, TenzoError>;
