//! ProductDoc persistence — one JSON snapshot per session, plus a
//! markdown export matching the filesystem layout
//! (`{output_dir}/{session_id}/product-doc.md`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use pf_domain::entities::ProductDoc;
use pf_domain::error::{Error, Result};

pub trait ProductDocStore: Send + Sync {
    fn get(&self, session_id: &str) -> Result<ProductDoc>;
    fn save(&self, session_id: &str, doc: &ProductDoc) -> Result<()>;
    fn export_markdown(&self, session_id: &str, output_dir: &Path, doc: &ProductDoc) -> Result<PathBuf>;
}

pub struct JsonProductDocStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, ProductDoc>>,
}

impl JsonProductDocStore {
    pub fn new(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("product_docs");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;
        Ok(Self { dir, cache: RwLock::new(HashMap::new()) })
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }
}

impl ProductDocStore for JsonProductDocStore {
    fn get(&self, session_id: &str) -> Result<ProductDoc> {
        if let Some(doc) = self.cache.read().get(session_id) {
            return Ok(doc.clone());
        }
        let path = self.path(session_id);
        let doc: ProductDoc = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            ProductDoc::default()
        };
        self.cache.write().insert(session_id.to_string(), doc.clone());
        Ok(doc)
    }

    fn save(&self, session_id: &str, doc: &ProductDoc) -> Result<()> {
        let raw = serde_json::to_string_pretty(doc).map_err(Error::Json)?;
        std::fs::write(self.path(session_id), raw).map_err(Error::Io)?;
        self.cache.write().insert(session_id.to_string(), doc.clone());
        Ok(())
    }

    fn export_markdown(&self, session_id: &str, output_dir: &Path, doc: &ProductDoc) -> Result<PathBuf> {
        let session_dir = output_dir.join(session_id);
        std::fs::create_dir_all(&session_dir).map_err(Error::Io)?;
        let mut md = String::new();
        if !doc.project_card.is_empty() {
            md.push_str("# Project Card\n\n");
            md.push_str(&doc.project_card);
            md.push_str("\n\n");
        }
        let mut sections: Vec<_> = doc.sections.iter().collect();
        sections.sort_by_key(|(name, _)| name.clone());
        for (_, section) in sections {
            md.push_str(&format!("## {}\n\n{}\n\n", section.title, section.content));
        }
        let path = session_dir.join("product-doc.md");
        std::fs::write(&path, md).map_err(Error::Io)?;
        Ok(path)
    }
}
