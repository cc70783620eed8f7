//! Append-only CSV logs. Every row is flushed as soon as it is written, so
//! an interrupted session leaves a complete file behind.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use tactex_core::{ResponseLabels, TrialOutcome};
use tactex_device::{ForceReading, TapPhase};
use tracing::debug;

use crate::RecordError;

pub const OUTCOME_HEADER: [&str; 8] = [
    "SubjectID",
    "Condition",
    "OverallTrial",
    "SpecificTrial",
    "ReferenceLevel",
    "ProbeLevel",
    "Response",
    "TrialDuration",
];

pub const FORCE_HEADER: [&str; 6] = [
    "TrialNumber",
    "Condition",
    "TapType",
    "Intensity",
    "Timestamp",
    "ForceData",
];

/// Quote a field when it holds a separator, quote or line break.
pub fn escape_field(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

pub struct CsvWriter {
    out: Option<BufWriter<Box<dyn Write + Send>>>,
}

impl CsvWriter {
    pub fn new(out: Box<dyn Write + Send>, header: &[&str]) -> Result<Self, RecordError> {
        let mut writer = Self {
            out: Some(BufWriter::new(out)),
        };
        writer.write_row(header)?;
        Ok(writer)
    }

    pub fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), RecordError> {
        let out = self.out.as_mut().ok_or(RecordError::Closed)?;
        let line = fields
            .iter()
            .map(|f| escape_field(f.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), RecordError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

/// Create `path` (and its parent directory) for writing.
fn create_file(path: &Path) -> Result<Box<dyn Write + Send>, RecordError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|source| RecordError::Create {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| RecordError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Box::new(file))
}

/// Per-trial outcome log
pub struct OutcomeRecorder {
    csv: CsvWriter,
    labels: ResponseLabels,
    rows: usize,
}

impl OutcomeRecorder {
    pub fn new(out: Box<dyn Write + Send>, labels: ResponseLabels) -> Result<Self, RecordError> {
        Ok(Self {
            csv: CsvWriter::new(out, &OUTCOME_HEADER)?,
            labels,
            rows: 0,
        })
    }

    pub fn create(path: &Path, labels: ResponseLabels) -> Result<Self, RecordError> {
        let recorder = Self::new(create_file(path)?, labels)?;
        debug!(path = %path.display(), "outcome log created");
        Ok(recorder)
    }

    pub fn record(&mut self, outcome: &TrialOutcome) -> Result<(), RecordError> {
        self.csv.write_row(&[
            outcome.participant.clone(),
            outcome.condition_label(),
            outcome.overall_trial.to_string(),
            outcome.specific_trial.to_string(),
            outcome.reference_level.to_string(),
            outcome.probe_level.to_string(),
            outcome.response.label(self.labels).to_string(),
            outcome.duration_secs(),
        ])?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn close(&mut self) -> Result<(), RecordError> {
        self.csv.close()
    }
}

/// One tap of the pair, as written to the force log
#[derive(Debug, Clone, PartialEq)]
pub struct TapRecord {
    pub trial: usize,
    pub condition: u8,
    pub phase: TapPhase,
    pub intensity: u8,
    /// Unix seconds when the tap command was sent
    pub timestamp: f64,
    pub force: Option<ForceReading>,
}

/// Per-tap force log
pub struct ForceLog {
    csv: CsvWriter,
}

impl ForceLog {
    pub fn new(out: Box<dyn Write + Send>) -> Result<Self, RecordError> {
        Ok(Self {
            csv: CsvWriter::new(out, &FORCE_HEADER)?,
        })
    }

    /// Appends to an existing log, writing the header only for a new file.
    pub fn append(path: &Path) -> Result<Self, RecordError> {
        if !path.exists() {
            return Self::new(create_file(path)?);
        }
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|source| RecordError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            csv: CsvWriter {
                out: Some(BufWriter::new(Box::new(file))),
            },
        })
    }

    pub fn record(&mut self, tap: &TapRecord) -> Result<(), RecordError> {
        let tap_type = match tap.phase {
            TapPhase::Reference => "Fixed",
            TapPhase::Probe => "Variable",
        };
        self.csv.write_row(&[
            tap.trial.to_string(),
            tap.condition.to_string(),
            tap_type.to_string(),
            tap.intensity.to_string(),
            format!("{:.3}", tap.timestamp),
            tap.force.as_ref().map(|f| f.to_string()).unwrap_or_default(),
        ])
    }

    pub fn close(&mut self) -> Result<(), RecordError> {
        self.csv.close()
    }
}
