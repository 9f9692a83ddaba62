// 🩺 Run diagnostics - every notable thing a stage did, in order
// Created per run, passed explicitly into each stage, flushed at run end.
// Each entry is also mirrored to `tracing` as it is recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub level: DiagnosticLevel,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    stage: String,
    events: Vec<DiagnosticEvent>,
}

impl Diagnostics {
    /// Start diagnostics for a new run.
    pub fn new() -> Self {
        Diagnostics {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            stage: "pipeline".to_string(),
            events: Vec::new(),
        }
    }

    /// Diagnostics for one stage of this run. Absorb it back with `merge`.
    pub fn scoped(&self, stage: &str) -> Diagnostics {
        Diagnostics {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            stage: stage.to_string(),
            events: Vec::new(),
        }
    }

    pub fn merge(&mut self, child: Diagnostics) {
        self.events.extend(child.events);
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.record(DiagnosticLevel::Debug, message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(DiagnosticLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(DiagnosticLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(DiagnosticLevel::Error, message.into());
    }

    fn record(&mut self, level: DiagnosticLevel, message: String) {
        let stage = self.stage.as_str();
        let run_id = self.run_id.as_str();
        match level {
            DiagnosticLevel::Debug => tracing::debug!(run_id, stage, "{}", message),
            DiagnosticLevel::Info => tracing::info!(run_id, stage, "{}", message),
            DiagnosticLevel::Warn => tracing::warn!(run_id, stage, "{}", message),
            DiagnosticLevel::Error => tracing::error!(run_id, stage, "{}", message),
        }

        self.events.push(DiagnosticEvent {
            timestamp: Utc::now(),
            stage: self.stage.clone(),
            level,
            message,
        });
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn count(&self, level: DiagnosticLevel) -> usize {
        self.events.iter().filter(|e| e.level == level).count()
    }

    /// End of run: log a summary and hand back the collected events.
    pub fn flush(self) -> Vec<DiagnosticEvent> {
        let elapsed = Utc::now() - self.started_at;
        tracing::info!(
            run_id = %self.run_id,
            events = self.events.len(),
            warnings = self.count(DiagnosticLevel::Warn),
            errors = self.count(DiagnosticLevel::Error),
            elapsed_ms = elapsed.num_milliseconds(),
            "run finished"
        );
        self.events
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
