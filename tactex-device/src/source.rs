use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::LineError;

/// Result of one bounded poll
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Line(String),
    Timeout,
    /// The stream ended; no further lines will arrive
    Closed,
}

/// A newline-delimited text stream that can be polled with a timeout
pub trait LineSource: Send {
    fn poll_line(&mut self, timeout: Duration) -> Result<LineEvent, LineError>;

    /// Discard anything already buffered. Returns the number of lines dropped.
    fn drain(&mut self) -> usize;
}

/// Lines delivered over a channel, typically by [`spawn_reader`]
pub struct ChannelLines {
    rx: Receiver<Result<String, LineError>>,
}

/// Sending half paired with [`ChannelLines`]
pub type LineFeed = Sender<Result<String, LineError>>;

impl ChannelLines {
    pub fn new(rx: Receiver<Result<String, LineError>>) -> Self {
        Self { rx }
    }

    pub fn pair() -> (LineFeed, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self::new(rx))
    }
}

impl LineSource for ChannelLines {
    fn poll_line(&mut self, timeout: Duration) -> Result<LineEvent, LineError> {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(line)) => Ok(LineEvent::Line(line)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(LineEvent::Timeout),
            Err(RecvTimeoutError::Disconnected) => Ok(LineEvent::Closed),
        }
    }

    fn drain(&mut self) -> usize {
        let mut dropped = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        dropped
    }
}

/// Reads `reader` on a background thread, one line per message.
///
/// Lines that are not valid UTF-8 are forwarded as [`LineError::Decode`] and
/// reading continues. The channel closes at end of stream or on a hard I/O
/// error.
pub fn spawn_reader<R>(reader: R) -> std::io::Result<ChannelLines>
where
    R: Read + Send + 'static,
{
    let (tx, lines) = ChannelLines::pair();
    thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || read_lines(BufReader::new(reader), tx))?;
    Ok(lines)
}

fn read_lines<R: BufRead>(mut reader: R, tx: LineFeed) {
    let mut buf = Vec::with_capacity(64);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                debug!("serial stream reached end of input");
                break;
            }
            Ok(_) => {
                let message = String::from_utf8(buf.clone())
                    .map(|s| s.trim_end_matches(['\r', '\n']).to_string())
                    .map_err(LineError::from);
                if tx.send(message).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                continue;
            }
            Err(e) => {
                warn!(error = %e, "serial read failed");
                let _ = tx.send(Err(LineError::Io(e)));
                break;
            }
        }
    }
}
