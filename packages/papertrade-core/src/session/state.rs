//! Session state, its snapshot view and its persistence.

use super::config::SessionConfig;
use crate::store::{default_data_path, Backend, FileBackend, MemoryBackend};
use crate::Result;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Environment variable overriding the default session file.
pub const SESSION_FILE_ENV: &str = "PAPERTRADE_SESSION_FILE";

/// Log lines kept per session.
pub const SESSION_LOG_CAP: usize = 200;

/// Lifecycle stage of the automated session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    #[default]
    Idle,
    WaitingEntry,
    Active,
}

/// Timestamped line of the session log feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub message: String,
}

/// Quantity bought for a symbol during the current session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenedPosition {
    pub symbol: String,
    pub quantity: f64,
}

/// Full persisted session state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub stage: SessionStage,
    /// Identifies the current run; quote fetches from an older run are discarded
    pub run_id: Option<Uuid>,
    pub config: Option<SessionConfig>,
    /// Entry has been attempted for this run
    pub entered: bool,
    pub logs: Vec<LogEntry>,
    pub opened: Vec<OpenedPosition>,
    pub started_at: Option<NaiveDateTime>,
}

impl SessionState {
    /// Whether `run_id` is the live run.
    pub fn is_current(&self, run_id: Uuid) -> bool {
        self.stage != SessionStage::Idle && self.run_id == Some(run_id)
    }

    pub fn push_log(&mut self, timestamp: NaiveDateTime, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp,
            message: message.into(),
        });
        if self.logs.len() > SESSION_LOG_CAP {
            let excess = self.logs.len() - SESSION_LOG_CAP;
            self.logs.drain(..excess);
        }
    }

    /// Record a fill for the opened set, merging repeat buys of a symbol.
    pub fn record_opened(&mut self, symbol: &str, quantity: f64) {
        match self.opened.iter_mut().find(|p| p.symbol == symbol) {
            Some(existing) => existing.quantity += quantity,
            None => self.opened.push(OpenedPosition {
                symbol: symbol.to_string(),
                quantity,
            }),
        }
    }

    /// Back to idle. The log of the finished run is kept.
    pub fn finish(&mut self) {
        self.stage = SessionStage::Idle;
        self.run_id = None;
        self.config = None;
        self.entered = false;
        self.opened.clear();
        self.started_at = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            stage: self.stage,
            run_id: self.run_id,
            config: self.config.clone(),
            logs: self.logs.clone(),
            opened_positions: self.opened.clone(),
            started_at: self.started_at,
        }
    }
}

/// Read-only view of the session for callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub stage: SessionStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<SessionConfig>,
    pub logs: Vec<LogEntry>,
    pub opened_positions: Vec<OpenedPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<NaiveDateTime>,
}

/// Persists [`SessionState`] as a JSON document.
#[derive(Debug)]
pub struct SessionStore {
    backend: Box<dyn Backend>,
}

impl SessionStore {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Default session file path.
    ///
    /// Default path: `~/.papertrade/session.json`
    /// Can be overridden with `PAPERTRADE_SESSION_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        default_data_path(SESSION_FILE_ENV, "session.json")
    }

    /// Load the persisted state. Missing or unreadable state yields an idle session.
    pub fn load(&self) -> SessionState {
        let contents = match self.backend.load() {
            Ok(Some(contents)) => contents,
            Ok(None) => return SessionState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session state, starting idle");
                return SessionState::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Persisted session state is corrupted, starting idle");
            SessionState::default()
        })
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        let contents = serde_json::to_string_pretty(state)?;
        self.backend.save(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = SessionStore::open(dir.path().join("session.json"));
        assert_eq!(store.load(), SessionState::default());

        let mut state = SessionState {
            stage: SessionStage::Active,
            run_id: Some(Uuid::new_v4()),
            config: Some(SessionConfig::default()),
            entered: true,
            ..Default::default()
        };
        state.record_opened("INFY", 3.0);
        state.push_log(at(9, 20), "Entered");
        store.save(&state).unwrap();

        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_corrupted_state_loads_idle() {
        let store = SessionStore::new(MemoryBackend::with_contents("{{{"));
        assert_eq!(store.load().stage, SessionStage::Idle);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionStage::WaitingEntry).unwrap(),
            "\"waiting_entry\""
        );
    }

    #[test]
    fn test_log_is_capped() {
        let mut state = SessionState::default();
        for i in 0..(SESSION_LOG_CAP + 10) {
            state.push_log(at(9, 0), format!("line {i}"));
        }
        assert_eq!(state.logs.len(), SESSION_LOG_CAP);
        assert_eq!(state.logs[0].message, "line 10");
    }

    #[test]
    fn test_finish_keeps_logs() {
        let run_id = Uuid::new_v4();
        let mut state = SessionState {
            stage: SessionStage::Active,
            run_id: Some(run_id),
            ..Default::default()
        };
        assert!(state.is_current(run_id));

        state.record_opened("TCS", 1.0);
        state.record_opened("TCS", 2.0);
        assert_eq!(state.opened[0].quantity, 3.0);

        state.push_log(at(15, 10), "Exit");
        state.finish();

        assert!(!state.is_current(run_id));
        assert!(state.opened.is_empty());
        assert_eq!(state.logs.len(), 1);
    }
}
