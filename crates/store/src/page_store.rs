//! Page index + PageVersion history.
//!
//! `Page` records live in a JSON snapshot per session (small, read far
//! more than written). `PageVersion`s are immutable and append only, so
//! they're a JSONL history per page — linearizable per `page_id` via a
//! per-page lock, which is what keeps `version` contiguous under
//! concurrent edits from different Runs (Open Questions).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use pf_domain::entities::{Page, PageVersion};
use pf_domain::error::{Error, Result};
use uuid::Uuid;

pub trait PageStore: Send + Sync {
    fn get(&self, session_id: &str, page_id: Uuid) -> Result<Option<Page>>;
    fn get_by_slug(&self, session_id: &str, slug: &str) -> Result<Option<Page>>;
    fn list(&self, session_id: &str) -> Result<Vec<Page>>;

    /// Create a new Page with its first PageVersion. Fails if `slug` is
    /// already taken within the session ("unique per session").
    fn create_page(&self, session_id: &str, slug: &str, title: &str, order_index: u32, html: String, description: &str) -> Result<(Page, PageVersion)>;

    /// Append a new PageVersion to an existing page and advance
    /// `current_version_id`.
    fn add_version(&self, session_id: &str, page_id: Uuid, html: String, description: &str) -> Result<(Page, PageVersion)>;

    fn list_versions(&self, session_id: &str, page_id: Uuid) -> Result<Vec<PageVersion>>;

    /// Point `current_version_id` at an earlier version without deleting
    /// later ones ("Rollback points... at an earlier version").
    fn rollback(&self, session_id: &str, page_id: Uuid, version: u32) -> Result<Page>;
}

pub struct JsonPageStore {
    dir: PathBuf,
    pages: RwLock<HashMap<String, HashMap<Uuid, Page>>>,
    page_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl JsonPageStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("pages");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir, pages: RwLock::new(HashMap::new()), page_locks: RwLock::new(HashMap::new()) })
    }

    fn index_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn versions_path(&self, session_id: &str, page_id: Uuid) -> PathBuf {
        self.dir.join(format!("{session_id}-{page_id}-versions.jsonl"))
    }

    fn load_index(&self, session_id: &str) -> Result<HashMap<Uuid, Page>> {
        if let Some(pages) = self.pages.read().get(session_id) {
            return Ok(pages.clone());
        }
        let path = self.index_path(session_id);
        let pages: HashMap<Uuid, Page> = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };
        self.pages.write().insert(session_id.to_string(), pages.clone());
        Ok(pages)
    }

    fn flush_index(&self, session_id: &str, pages: &HashMap<Uuid, Page>) -> Result<()> {
        let raw = serde_json::to_string_pretty(pages).map_err(Error::Json)?;
        std::fs::write(self.index_path(session_id), raw).map_err(Error::Io)?;
        self.pages.write().insert(session_id.to_string(), pages.clone());
        Ok(())
    }

    fn lock_for(&self, page_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(l) = self.page_locks.read().get(&page_id) {
            return l.clone();
        }
        let mut locks = self.page_locks.write();
        locks.entry(page_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn append_version(&self, session_id: &str, page_id: Uuid, version: &PageVersion) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.versions_path(session_id, page_id))
            .map_err(Error::Io)?;
        let line = serde_json::to_string(version).map_err(Error::Json)?;
        writeln!(file, "{line}").map_err(Error::Io)
    }
}

impl PageStore for JsonPageStore {
    fn get(&self, session_id: &str, page_id: Uuid) -> Result<Option<Page>> {
        Ok(self.load_index(session_id)?.get(&page_id).cloned())
    }

    fn get_by_slug(&self, session_id: &str, slug: &str) -> Result<Option<Page>> {
        Ok(self.load_index(session_id)?.values().find(|p| p.slug == slug).cloned())
    }

    fn list(&self, session_id: &str) -> Result<Vec<Page>> {
        let mut pages: Vec<Page> = self.load_index(session_id)?.into_values().collect();
        pages.sort_by_key(|p| p.order_index);
        Ok(pages)
    }

    fn create_page(&self, session_id: &str, slug: &str, title: &str, order_index: u32, html: String, description: &str) -> Result<(Page, PageVersion)> {
        Page::validate_slug(slug)?;
        let mut index = self.load_index(session_id)?;
        if index.values().any(|p| p.slug == slug) {
            return Err(Error::Validation(format!("slug {slug:?} already exists in session {session_id}")));
        }
        let page_id = Uuid::new_v4();
        let version = PageVersion::first(page_id, html, description);
        let page = Page {
            page_id,
            session_id: session_id.to_string(),
            slug: slug.to_string(),
            title: title.to_string(),
            order_index,
            current_version_id: version.version_id,
        };
        self.append_version(session_id, page_id, &version)?;
        index.insert(page_id, page.clone());
        self.flush_index(session_id, &index)?;
        pf_domain::trace::TraceEvent::PageVersionCreated { session_id: session_id.to_string(), slug: slug.to_string(), version: version.version }.emit();
        Ok((page, version))
    }

    fn add_version(&self, session_id: &str, page_id: Uuid, html: String, description: &str) -> Result<(Page, PageVersion)> {
        let lock = self.lock_for(page_id);
        let _guard = lock.lock();

        let mut index = self.load_index(session_id)?;
        let page = index.get(&page_id).cloned().ok_or_else(|| Error::NotFound(format!("page {page_id}")))?;
        let versions = self.list_versions(session_id, page_id)?;
        let last = versions.last().ok_or_else(|| Error::NotFound(format!("no versions for page {page_id}")))?;
        let next = last.next(html, description);
        self.append_version(session_id, page_id, &next)?;

        let mut updated = page;
        updated.current_version_id = next.version_id;
        index.insert(page_id, updated.clone());
        self.flush_index(session_id, &index)?;
        pf_domain::trace::TraceEvent::PageVersionCreated { session_id: session_id.to_string(), slug: updated.slug.clone(), version: next.version }.emit();
        Ok((updated, next))
    }

    fn list_versions(&self, session_id: &str, page_id: Uuid) -> Result<Vec<PageVersion>> {
        let path = self.versions_path(session_id, page_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&path).map_err(Error::Io)?;
        let reader = BufReader::new(file);
        let mut versions = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(Error::Io)?;
            if line.trim().is_empty() {
                continue;
            }
            versions.push(serde_json::from_str::<PageVersion>(&line).map_err(Error::Json)?);
        }
        Ok(versions)
    }

    fn rollback(&self, session_id: &str, page_id: Uuid, version: u32) -> Result<Page> {
        let lock = self.lock_for(page_id);
        let _guard = lock.lock();

        let versions = self.list_versions(session_id, page_id)?;
        let target = versions
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| Error::NotFound(format!("page {page_id} has no version {version}")))?;

        let mut index = self.load_index(session_id)?;
        let mut page = index.get(&page_id).cloned().ok_or_else(|| Error::NotFound(format!("page {page_id}")))?;
        page.current_version_id = target.version_id;
        index.insert(page_id, page.clone());
        self.flush_index(session_id, &index)?;
        Ok(page)
    }
}
