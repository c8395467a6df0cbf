//! Run index  — a JSON snapshot file per session, one entry per
//! Run. Mutable, small, read far more than written — unlike events and
//! page versions, Run records are updated in place as the loop progresses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pf_domain::entities::Run;
use pf_domain::error::{Error, Result};
use uuid::Uuid;

pub trait RunStore: Send + Sync {
    fn create(&self, run: Run) -> Result<()>;
    fn get(&self, session_id: &str, run_id: Uuid) -> Result<Option<Run>>;
    fn save(&self, run: &Run) -> Result<()>;
    fn list_by_session(&self, session_id: &str) -> Result<Vec<Run>>;
}

pub struct JsonRunStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, HashMap<Uuid, Run>>>,
}

impl JsonRunStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("runs");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir, cache: RwLock::new(HashMap::new()) })
    }

    fn file_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn load(&self, session_id: &str) -> Result<HashMap<Uuid, Run>> {
        if let Some(runs) = self.cache.read().get(session_id) {
            return Ok(runs.clone());
        }
        let path = self.file_path(session_id);
        let runs: HashMap<Uuid, Run> = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        self.cache.write().insert(session_id.to_string(), runs.clone());
        Ok(runs)
    }

    fn flush(&self, session_id: &str, runs: &HashMap<Uuid, Run>) -> Result<()> {
        let raw = serde_json::to_string_pretty(runs).map_err(Error::Json)?;
        std::fs::write(self.file_path(session_id), raw).map_err(Error::Io)?;
        self.cache.write().insert(session_id.to_string(), runs.clone());
        Ok(())
    }
}

impl RunStore for JsonRunStore {
    fn create(&self, run: Run) -> Result<()> {
        let mut runs = self.load(&run.session_id)?;
        if runs.contains_key(&run.run_id) {
            return Err(Error::StateConflict(format!("run {} already exists", run.run_id)));
        }
        let session_id = run.session_id.clone();
        runs.insert(run.run_id, run);
        self.flush(&session_id, &runs)
    }

    fn get(&self, session_id: &str, run_id: Uuid) -> Result<Option<Run>> {
        Ok(self.load(session_id)?.get(&run_id).cloned())
    }

    fn save(&self, run: &Run) -> Result<()> {
        let mut runs = self.load(&run.session_id)?;
        runs.insert(run.run_id, run.clone());
        self.flush(&run.session_id, &runs)
    }

    fn list_by_session(&self, session_id: &str) -> Result<Vec<Run>> {
        let mut runs: Vec<Run> = self.load(session_id)?.into_values().collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path()).unwrap();
        let run = Run::new("sess-1", "build a menu page");
        let run_id = run.run_id;
        store.create(run).unwrap();
        let got = store.get("sess-1", run_id).unwrap().unwrap();
        assert_eq!(got.run_id, run_id);
    }

    #[test]
    fn create_twice_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path()).unwrap();
        let run = Run::new("sess-1", "msg");
        store.create(run.clone()).unwrap();
        assert!(store.create(run).is_err());
    }

    #[test]
    fn save_persists_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path()).unwrap();
        let mut run = Run::new("sess-1", "msg");
        store.create(run.clone()).unwrap();
        run.transition(pf_domain::entities::RunStatus::Running).unwrap();
        store.save(&run).unwrap();

        let reloaded = JsonRunStore::new(dir.path()).unwrap();
        let got = reloaded.get("sess-1", run.run_id).unwrap().unwrap();
        assert_eq!(got.status, pf_domain::entities::RunStatus::Running);
    }

    #[test]
    fn list_by_session_only_returns_that_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonRunStore::new(dir.path()).unwrap();
        store.create(Run::new("sess-1", "a")).unwrap();
        store.create(Run::new("sess-1", "b")).unwrap();
        store.create(Run::new("sess-2", "c")).unwrap();
        assert_eq!(store.list_by_session("sess-1").unwrap().len(), 2);
    }
}
