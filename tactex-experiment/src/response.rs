use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use tactex_core::Key;

use crate::ResponseError;

/// Where participant key presses come from. Waits have no timeout.
pub trait ResponseSource {
    fn next_key(&mut self) -> Result<Key, ResponseError>;

    /// Checked between trials so a session can stop without a pending wait.
    fn interrupted(&self) -> bool {
        false
    }
}

/// Keys delivered over a channel, with an interrupt flag checked while waiting
pub struct ChannelKeys {
    rx: Receiver<Result<Key, ResponseError>>,
    interrupt: Arc<AtomicBool>,
    poll: Duration,
}

impl ChannelKeys {
    pub fn new(rx: Receiver<Result<Key, ResponseError>>, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            rx,
            interrupt,
            poll: Duration::from_millis(50),
        }
    }
}

impl ResponseSource for ChannelKeys {
    fn next_key(&mut self) -> Result<Key, ResponseError> {
        loop {
            if self.interrupted() {
                return Err(ResponseError::Interrupted);
            }
            match self.rx.recv_timeout(self.poll) {
                Ok(key) => return key,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(ResponseError::Closed),
            }
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }
}
