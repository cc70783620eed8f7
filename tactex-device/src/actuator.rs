use std::fmt;
use std::io::Write;

use tracing::debug;

use crate::ActuatorError;

/// Which tap of the pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapPhase {
    /// Fixed reference intensity
    Reference = 0,
    /// Adaptive probe intensity
    Probe = 1,
}

/// Commands understood by the platform controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Move { distance_cm: f64, speed_cm_s: f64 },
    MoveReturn { distance_cm: f64, speed_cm_s: f64 },
    Tap {
        phase: TapPhase,
        condition: u8,
        reference: u8,
        probe: u8,
    },
    /// Releases the controller after the participant confirms
    Continue,
}

impl Command {
    /// Wire form, including the trailing newline.
    pub fn encode(&self) -> Result<String, ActuatorError> {
        Ok(match self {
            Command::Move {
                distance_cm,
                speed_cm_s,
            } => format!("MOVE {distance_cm} {speed_cm_s}\n"),
            Command::MoveReturn {
                distance_cm,
                speed_cm_s,
            } => format!("MOVE_RETURN {distance_cm} {speed_cm_s}\n"),
            Command::Tap {
                phase,
                condition,
                reference,
                probe,
            } => {
                let phase = *phase as u8;
                let fields = [
                    ("condition", *condition),
                    ("reference", *reference),
                    ("probe", *probe),
                ];
                if let Some(&(field, value)) = fields.iter().find(|(_, v)| *v > 9) {
                    return Err(ActuatorError::Encode { field, value });
                }
                format!("{phase}{condition}{reference}{probe}\n")
            }
            Command::Continue => "continue\n".to_string(),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(line) => write!(f, "{}", line.trim_end()),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// Whether a command reached the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// No device attached
    Skipped,
}

/// Write-only command link to the platform controller
pub struct ActuatorChannel {
    writer: Option<Box<dyn Write + Send>>,
}

impl ActuatorChannel {
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(writer),
        }
    }

    /// A channel with no hardware; every send is skipped.
    pub fn disconnected() -> Self {
        Self { writer: None }
    }

    pub fn connected(&self) -> bool {
        self.writer.is_some()
    }

    pub fn send(&mut self, command: &Command) -> Result<SendOutcome, ActuatorError> {
        let line = command.encode()?;
        let Some(writer) = self.writer.as_mut() else {
            debug!(%command, "serial not connected; skipping command");
            return Ok(SendOutcome::Skipped);
        };
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
        debug!(%command, "sent command");
        Ok(SendOutcome::Sent)
    }

    /// Releases the underlying device.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
            debug!("actuator channel closed");
        }
    }
}
