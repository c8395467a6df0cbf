//! Session index — a JSON snapshot file, one entry per Session.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pf_domain::entities::Session;
use pf_domain::error::{Error, Result};

pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: &str) -> Option<Session>;
    /// Look up a Session by id, creating one if absent. Returns `(session, is_new)`.
    fn resolve_or_create(&self, session_id: &str) -> Result<(Session, bool)>;
    fn save(&self, session: &Session) -> Result<()>;
}

pub struct JsonSessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

impl JsonSessionStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        let path = dir.join("sessions.json");
        let sessions = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        tracing::info!(sessions = sessions.len(), path = %path.display(), "session store loaded");
        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    fn flush(&self, sessions: &HashMap<String, Session>) -> Result<()> {
        let raw = serde_json::to_string_pretty(sessions).map_err(Error::Json)?;
        std::fs::write(&self.path, raw).map_err(Error::Io)
    }
}

impl SessionStore for JsonSessionStore {
    fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().get(session_id).cloned()
    }

    fn resolve_or_create(&self, session_id: &str) -> Result<(Session, bool)> {
        {
            let sessions = self.sessions.read();
            if let Some(existing) = sessions.get(session_id) {
                return Ok((existing.clone(), false));
            }
        }
        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.get(session_id) {
            return Ok((existing.clone(), false));
        }
        let session = Session::new(session_id);
        sessions.insert(session_id.to_string(), session.clone());
        self.flush(&sessions)?;
        Ok((session, true))
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write();
        sessions.insert(session.session_id.clone(), session.clone());
        self.flush(&sessions)
    }
}
