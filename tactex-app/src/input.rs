//! Terminal key reader. Each line typed on stdin is one key press.

use std::io::{BufRead, ErrorKind};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use tactex_core::Key;
use tactex_experiment::{ChannelKeys, ResponseError};
use tracing::{debug, warn};

pub fn parse_key(line: &str) -> Option<Key> {
    match line.trim().to_ascii_lowercase().as_str() {
        "l" | "left" | "1" => Some(Key::Left),
        "r" | "right" | "2" => Some(Key::Right),
        "u" | "up" | "c" => Some(Key::Up),
        _ => None,
    }
}

/// Read keys from `reader` on a background thread.
///
/// The returned source reports `Closed` once the reader hits end of input, and
/// `Interrupted` as soon as `interrupt` is raised.
pub fn spawn_key_reader<R>(reader: R, interrupt: Arc<AtomicBool>) -> std::io::Result<ChannelKeys>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("key-reader".into())
        .spawn(move || read_keys(reader, tx))?;
    Ok(ChannelKeys::new(rx, interrupt))
}

fn read_keys<R: BufRead>(mut reader: R, tx: Sender<Result<Key, ResponseError>>) {
    let mut buf = Vec::with_capacity(16);
    loop {
        buf.clear();
        let event = match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => match parse_key(line) {
                    Some(key) => Ok(key),
                    None => {
                        warn!(input = %line.trim(), "unrecognised key; use l, r or u");
                        continue;
                    }
                },
                // A garbled line fails this answer only; later keys still count.
                Err(e) => Err(ResponseError::Device(e.to_string())),
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, "terminal input failed");
                let _ = tx.send(Err(ResponseError::Device(e.to_string())));
                break;
            }
        };
        if tx.send(event).is_err() {
            return;
        }
    }
    debug!("terminal input closed");
}
