//! Ingestion progress reporting.
//!
//! Ingesting an upload batch goes through five phases, each with a fixed
//! percentage. Progress is emitted on **stderr** so stdout stays parseable.

use serde::Serialize;
use std::io::Write;

/// Phase of an ingestion run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestPhase {
    /// Reading PDFs from disk.
    Loading,
    /// Splitting pages into parents and children.
    Structuring,
    /// Embedding children and filling the stores.
    Building,
    /// Wiring the conversational pipeline.
    CreatingAssistant,
    Ready,
}

impl IngestPhase {
    pub fn percent(self) -> u8 {
        match self {
            IngestPhase::Loading => 0,
            IngestPhase::Structuring => 25,
            IngestPhase::Building => 50,
            IngestPhase::CreatingAssistant => 75,
            IngestPhase::Ready => 100,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            IngestPhase::Loading => "Loading documents...",
            IngestPhase::Structuring => "Structuring content...",
            IngestPhase::Building => "Building knowledge base...",
            IngestPhase::CreatingAssistant => "Creating AI assistant...",
            IngestPhase::Ready => "Ready! Ask a question about your documents.",
        }
    }
}

/// Receives phase changes during ingestion.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase: IngestPhase);
}

/// Human-friendly progress on stderr: `[ 50%] Building knowledge base...`.
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, phase: IngestPhase) {
        let line = format!("[{:>3}%] {}\n", phase.percent(), phase.message());
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, phase: IngestPhase) {
        let obj = serde_json::json!({
            "event": "progress",
            "phase": phase,
            "percent": phase.percent(),
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _phase: IngestPhase) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_monotonic() {
        let phases = [
            IngestPhase::Loading,
            IngestPhase::Structuring,
            IngestPhase::Building,
            IngestPhase::CreatingAssistant,
            IngestPhase::Ready,
        ];
        let pct: Vec<u8> = phases.iter().map(|p| p.percent()).collect();
        assert_eq!(pct, vec![0, 25, 50, 75, 100]);
    }

    #[test]
    fn phase_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(IngestPhase::CreatingAssistant).unwrap(),
            "creating_assistant"
        );
    }
}
