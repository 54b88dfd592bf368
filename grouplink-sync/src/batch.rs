//! Batch state machine: the persisted, resumable progress of one job.
//!
//! Persists one [`BatchState`] JSON document per job identifier at
//! `<home>/.grouplink/batches/<identifier>.json`. Writes use the same atomic
//! `.tmp` + rename pattern as the registries. The presence of the file is the
//! answer to "is job X still running".

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use grouplink_core::paths::{batches_dir_at, write_atomic};
use serde::{Deserialize, Serialize};

use crate::cursor::StepCursor;
use crate::error::{io_err, SyncError, SyncResult};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Stage of a reconciliation job. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    /// Add missing memberships on the target side.
    Additive,
    /// Remove stale memberships from the target side.
    Subtractive,
    /// Cleanup; the next step deletes the batch.
    Terminal,
}

impl Phase {
    pub fn number(self) -> u8 {
        match self {
            Phase::Additive => 0,
            Phase::Subtractive => 1,
            Phase::Terminal => 2,
        }
    }

    /// The following phase; terminal stays terminal.
    pub fn succ(self) -> Phase {
        match self {
            Phase::Additive => Phase::Subtractive,
            Phase::Subtractive | Phase::Terminal => Phase::Terminal,
        }
    }
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase.number()
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Phase::Additive),
            1 => Ok(Phase::Subtractive),
            2 => Ok(Phase::Terminal),
            other => Err(format!("unknown batch phase {other}")),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Additive => write!(f, "additive"),
            Phase::Subtractive => write!(f, "subtractive"),
            Phase::Terminal => write!(f, "terminal"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchState {
    pub identifier: String,
    pub phase: Phase,
    pub cursor: StepCursor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchState {
    fn fresh(identifier: &str, step_size: u64) -> Self {
        let now = Utc::now();
        Self {
            identifier: identifier.to_owned(),
            phase: Phase::Additive,
            cursor: StepCursor::new(step_size),
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Directory of batch state files.
#[derive(Debug, Clone)]
pub struct BatchStore {
    dir: PathBuf,
}

impl BatchStore {
    /// `<home>/.grouplink/batches/`
    pub fn at(home: &Path) -> Self {
        Self::in_dir(batches_dir_at(home))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<identifier>.json`, after validating the identifier.
    pub fn state_path(&self, identifier: &str) -> SyncResult<PathBuf> {
        validate_identifier(identifier)?;
        Ok(self.dir.join(format!("{identifier}.json")))
    }

    pub fn load(&self, identifier: &str) -> SyncResult<Option<BatchState>> {
        let path = self.state_path(identifier)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    pub fn save(&self, state: &BatchState) -> SyncResult<()> {
        let path = self.state_path(&state.identifier)?;
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&path, &json).map_err(|e| io_err(&path, e))
    }

    /// Remove the state for `identifier`; `false` when there was none.
    pub fn remove(&self, identifier: &str) -> SyncResult<bool> {
        let path = self.state_path(identifier)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    /// Every persisted batch, sorted by identifier.
    pub fn list(&self) -> SyncResult<Vec<BatchState>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut entries: Vec<_> = std::fs::read_dir(&self.dir)
            .map_err(|e| io_err(&self.dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
            .collect();
        entries.sort();

        let mut states = Vec::new();
        for path in entries {
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            states.push(serde_json::from_str(&contents)?);
        }
        Ok(states)
    }
}

fn validate_identifier(identifier: &str) -> SyncResult<()> {
    let valid = !identifier.is_empty()
        && identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidIdentifier(identifier.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Batch handle
// ---------------------------------------------------------------------------

/// One job's batch state, loaded from a [`BatchStore`].
///
/// Every mutating call is persisted before it returns.
pub struct Batch<'s> {
    store: &'s BatchStore,
    identifier: String,
    state: Option<BatchState>,
}

impl<'s> Batch<'s> {
    pub fn open(store: &'s BatchStore, identifier: &str) -> SyncResult<Self> {
        let state = store.load(identifier)?;
        Ok(Self {
            store,
            identifier: identifier.to_owned(),
            state,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Create phase 0 / offset 0 when nothing is persisted; return the phase.
    pub fn initialise(&mut self, step_size: u64) -> SyncResult<Phase> {
        if let Some(state) = self.state.as_ref() {
            return Ok(state.phase);
        }
        let state = BatchState::fresh(&self.identifier, step_size);
        self.store.save(&state)?;
        tracing::debug!("batch '{}' created (step size {step_size})", self.identifier);
        let phase = state.phase;
        self.state = Some(state);
        Ok(phase)
    }

    /// Move to the next phase with a fresh cursor.
    pub fn next(&mut self) -> SyncResult<Phase> {
        let identifier = self.identifier.clone();
        let state = self.state_mut()?;
        state.phase = state.phase.succ();
        state.cursor.reset();
        let phase = state.phase;
        self.persist()?;
        tracing::info!("batch '{identifier}' moved to phase {}", phase.number());
        Ok(phase)
    }

    /// Remove all persisted state; [`Batch::exists`] is false afterwards.
    pub fn delete(&mut self) -> SyncResult<()> {
        self.store.remove(&self.identifier)?;
        self.state = None;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.state.is_some()
    }

    /// Current phase, if the job exists.
    pub fn get(&self) -> Option<Phase> {
        self.state.as_ref().map(|s| s.phase)
    }

    pub fn state(&self) -> Option<&BatchState> {
        self.state.as_ref()
    }

    /// Offset of the active phase's current page.
    pub fn step_initialise(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.cursor.initialise())
    }

    /// Advance the active phase's cursor by one page.
    pub fn step_next(&mut self) -> SyncResult<u64> {
        self.step_next_after_removing(0)
    }

    /// Where the current page starts in the listing as it is now.
    pub fn step_fetch_offset(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.cursor.fetch_offset())
    }

    /// Advance by one page after the page deleted `removed` of its rows.
    pub fn step_next_after_removing(&mut self, removed: u64) -> SyncResult<u64> {
        let state = self.state_mut()?;
        state.cursor.record_removed(removed);
        state.cursor.next();
        let offset = state.cursor.get();
        self.persist()?;
        Ok(offset)
    }

    pub fn step_count_get(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(crate::cursor::DEFAULT_STEP_SIZE, |s| s.cursor.step_count_get())
    }

    pub fn step_count_set(&mut self, step_size: u64) -> SyncResult<()> {
        let state = self.state_mut()?;
        if state.cursor.step_count_get() == step_size {
            return Ok(());
        }
        state.cursor.step_count_set(step_size);
        self.persist()
    }

    pub fn cursor(&self) -> Option<StepCursor> {
        self.state.as_ref().map(|s| s.cursor)
    }

    fn state_mut(&mut self) -> SyncResult<&mut BatchState> {
        let identifier = self.identifier.clone();
        self.state.as_mut().ok_or_else(|| {
            io_err(
                identifier,
                std::io::Error::new(std::io::ErrorKind::NotFound, "batch not initialised"),
            )
        })
    }

    fn persist(&mut self) -> SyncResult<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        state.updated_at = Utc::now();
        self.store.save(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn initialise_creates_phase_zero_once() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        let mut batch = Batch::open(&store, "manual_crm_to_platform").unwrap();
        assert!(!batch.exists());
        assert_eq!(batch.initialise(2).unwrap(), Phase::Additive);
        batch.step_next().unwrap();

        let mut reopened = Batch::open(&store, "manual_crm_to_platform").unwrap();
        assert_eq!(reopened.initialise(99).unwrap(), Phase::Additive);
        assert_eq!(reopened.step_initialise(), 2);
        assert_eq!(reopened.step_count_get(), 2);
    }

    #[test]
    fn next_resets_cursor_and_saturates_at_terminal() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        let mut batch = Batch::open(&store, "job").unwrap();
        batch.initialise(3).unwrap();
        batch.step_next().unwrap();
        assert_eq!(batch.next().unwrap(), Phase::Subtractive);
        assert_eq!(batch.step_initialise(), 0);
        assert_eq!(batch.next().unwrap(), Phase::Terminal);
        assert_eq!(batch.next().unwrap(), Phase::Terminal);
    }

    #[test]
    fn delete_removes_file_and_allows_fresh_start() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        let mut batch = Batch::open(&store, "job").unwrap();
        batch.initialise(1).unwrap();
        batch.next().unwrap();
        batch.delete().unwrap();
        assert!(!batch.exists());
        assert!(!store.state_path("job").unwrap().exists());

        let mut again = Batch::open(&store, "job").unwrap();
        assert_eq!(again.initialise(1).unwrap(), Phase::Additive);
        assert_eq!(again.step_initialise(), 0);
    }

    #[test]
    fn removals_shift_fetch_offset_but_not_cursor() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        let mut batch = Batch::open(&store, "job").unwrap();
        batch.initialise(3).unwrap();
        batch.step_next_after_removing(2).unwrap();

        let reopened = Batch::open(&store, "job").unwrap();
        assert_eq!(reopened.step_initialise(), 3);
        assert_eq!(reopened.step_fetch_offset(), 1);
    }

    #[test]
    fn identifiers_must_be_filename_safe() {
        let store = BatchStore::in_dir("/nonexistent");
        for bad in ["", "../etc", "a b", "x/y"] {
            assert!(matches!(
                store.state_path(bad),
                Err(SyncError::InvalidIdentifier(_))
            ));
        }
        assert!(store.state_path("cron_platform-to-crm").is_ok());
    }

    #[test]
    fn list_returns_live_batches_sorted() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        for id in ["b_job", "a_job"] {
            Batch::open(&store, id).unwrap().initialise(5).unwrap();
        }
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.identifier).collect();
        assert_eq!(ids, vec!["a_job", "b_job"]);
    }

    #[test]
    fn phase_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Phase::Subtractive).unwrap(), "1");
        assert!(serde_json::from_str::<Phase>("7").is_err());
    }

    #[test]
    fn remove_missing_is_false() {
        let home = TempDir::new().unwrap();
        let store = BatchStore::at(home.path());
        assert!(!store.remove("never_created").unwrap());
    }
}
