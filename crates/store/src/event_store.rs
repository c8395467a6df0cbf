//! Event Store  — session-scoped, monotonic, gap-free append log.
//!
//! Persistence is append-only JSONL per session: `{state_path}/events/
//! {session_id}.jsonl`. A per-session lock guards seq allocation and the
//! file append together so concurrent Runs in the same Session cannot
//! interleave and produce a gap or duplicate `seq` ("Shared resources").

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use pf_domain::entities::{Event, EventType};
use pf_domain::error::{Error, Result};
use uuid::Uuid;

pub trait EventStore: Send + Sync {
    /// Allocate the next `seq` for `session_id` and append the event.
    /// Never raises past a store-level IO failure.
    fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        run_id: Option<Uuid>,
        source: &str,
        payload: serde_json::Value,
    ) -> Result<Event>;

    fn get_by_session(&self, session_id: &str, since_seq: Option<u64>, limit: usize) -> Result<Vec<Event>>;

    /// Filtered by `run_id`, still ordered by the original `seq`.
    fn get_by_run(&self, session_id: &str, run_id: Uuid, since_seq: Option<u64>, limit: usize) -> Result<Vec<Event>>;
}

pub struct JsonlEventStore {
    dir: PathBuf,
    /// Per-session next-seq counter, guarded so allocate+append is atomic.
    counters: RwLock<HashMap<String, Arc<Mutex<u64>>>>,
}

impl JsonlEventStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("events");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir, counters: RwLock::new(HashMap::new()) })
    }

    fn file_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.jsonl"))
    }

    fn counter_for(&self, session_id: &str) -> Arc<Mutex<u64>> {
        if let Some(c) = self.counters.read().get(session_id) {
            return c.clone();
        }
        let mut counters = self.counters.write();
        if let Some(c) = counters.get(session_id) {
            return c.clone();
        }
        let next = self.scan_max_seq(session_id).unwrap_or(0) + 1;
        let counter = Arc::new(Mutex::new(next));
        counters.insert(session_id.to_string(), counter.clone());
        counter
    }

    fn scan_max_seq(&self, session_id: &str) -> Option<u64> {
        let events = self.read_all(session_id).ok()?;
        events.last().map(|e| e.seq)
    }

    fn read_all(&self, session_id: &str) -> Result<Vec<Event>> {
        let path = self.file_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).map_err(Error::Io)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(Error::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<Event>(&line).map_err(Error::Json)?);
        }
        Ok(events)
    }
}

impl EventStore for JsonlEventStore {
    fn append(
        &self,
        session_id: &str,
        event_type: EventType,
        run_id: Option<Uuid>,
        source: &str,
        payload: serde_json::Value,
    ) -> Result<Event> {
        let counter = self.counter_for(session_id);
        let mut next_seq = counter.lock();
        let seq = *next_seq;
        let event = Event::new(seq, event_type, session_id, run_id, source, payload)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(session_id))
            .map_err(Error::Io)?;
        let line = serde_json::to_string(&event).map_err(Error::Json)?;
        writeln!(file, "{line}").map_err(Error::Io)?;

        *next_seq += 1;
        pf_domain::trace::TraceEvent::EventAppended {
            session_id: session_id.to_string(),
            run_id: run_id.map(|id| id.to_string()),
            seq,
            event_type: format!("{event_type:?}"),
        }
        .emit();
        Ok(event)
    }

    fn get_by_session(&self, session_id: &str, since_seq: Option<u64>, limit: usize) -> Result<Vec<Event>> {
        let mut events = self.read_all(session_id)?;
        if let Some(since) = since_seq {
            events.retain(|e| e.seq > since);
        }
        events.truncate(limit);
        Ok(events)
    }

    fn get_by_run(&self, session_id: &str, run_id: Uuid, since_seq: Option<u64>, limit: usize) -> Result<Vec<Event>> {
        let mut events = self.read_all(session_id)?;
        events.retain(|e| e.run_id == Some(run_id));
        if let Some(since) = since_seq {
            events.retain(|e| e.seq > since);
        }
        events.truncate(limit);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_gap_free_and_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path()).unwrap();
        let e1 = store.append("s1", EventType::RunCreated, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        let e2 = store.append("s1", EventType::RunStarted, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        assert_eq!(e1.seq, 1);
        assert_eq!(e2.seq, 2);
    }

    #[test]
    fn seq_is_per_session_not_global() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path()).unwrap();
        store.append("s1", EventType::RunCreated, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        let e = store.append("s2", EventType::RunCreated, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        assert_eq!(e.seq, 1);
    }

    #[test]
    fn run_scoped_event_without_run_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path()).unwrap();
        assert!(store.append("s1", EventType::ToolCall, None, "test", serde_json::json!({})).is_err());
    }

    #[test]
    fn get_by_run_preserves_seq_order_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path()).unwrap();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        store.append("s1", EventType::RunCreated, Some(run_a), "test", serde_json::json!({})).unwrap();
        store.append("s1", EventType::RunCreated, Some(run_b), "test", serde_json::json!({})).unwrap();
        store.append("s1", EventType::ToolCall, Some(run_a), "test", serde_json::json!({})).unwrap();

        let events = store.get_by_run("s1", run_a, None, 100).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].seq < events[1].seq);
    }

    #[test]
    fn since_seq_filters_incremental_catchup() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlEventStore::new(dir.path()).unwrap();
        let run = Uuid::new_v4();
        for _ in 0..5 {
            store.append("s1", EventType::ToolCall, Some(run), "test", serde_json::json!({})).unwrap();
        }
        let events = store.get_by_session("s1", Some(2), 100).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq, 3);
    }

    #[test]
    fn counter_recovers_from_disk_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonlEventStore::new(dir.path()).unwrap();
            store.append("s1", EventType::RunCreated, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        }
        let store2 = JsonlEventStore::new(dir.path()).unwrap();
        let e = store2.append("s1", EventType::RunStarted, Some(Uuid::new_v4()), "test", serde_json::json!({})).unwrap();
        assert_eq!(e.seq, 2);
    }
}
