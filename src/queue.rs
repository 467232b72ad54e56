// src/queue.rs
//! Bounded single-producer/single-consumer queue between the reader thread and the UI tick.
use crate::types::Sample;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TryRecvError};
use std::time::Duration;

#[derive(Debug, PartialEq)]
pub enum PushError {
    /// Still full after the timeout; the sample is handed back for a retry.
    Full(Sample),
    /// The consumer is gone.
    Closed(Sample),
}

pub fn sample_queue(capacity: usize) -> (SampleSender, SampleReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    (SampleSender { tx }, SampleReceiver { rx })
}

pub struct SampleSender {
    tx: Sender<Sample>,
}

impl SampleSender {
    /// Blocks for at most `timeout` waiting for room. Never drops the sample.
    pub fn push_timeout(&self, sample: Sample, timeout: Duration) -> Result<(), PushError> {
        self.tx.send_timeout(sample, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(s) => PushError::Full(s),
            SendTimeoutError::Disconnected(s) => PushError::Closed(s),
        })
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

pub struct SampleReceiver {
    rx: Receiver<Sample>,
}

impl SampleReceiver {
    /// Non-blocking pop; `None` when nothing is queued (or the producer is gone).
    pub fn try_pop(&self) -> Option<Sample> {
        match self.rx.try_recv() {
            Ok(s) => Some(s),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    #[cfg(test)]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Sample> {
        use crossbeam_channel::RecvTimeoutError;
        match self.rx.recv_timeout(timeout) {
            Ok(s) => Some(s),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Throws away everything currently queued, returning how many samples that was.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
