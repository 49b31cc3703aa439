//! Upload sessions
//!
//! One session per upload: the stored container, its cell index and a
//! bounded histogram cache. Sessions live until the process exits.

use chrono::{DateTime, Utc};
use histcache::HistCache;
use histstore::{build_index, CellIndex, GridSpec, HistFile};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub struct Session {
    pub token: String,
    /// Where the upload was stored
    pub path: PathBuf,
    /// File name the browser sent
    pub upload_name: String,
    pub grid: GridSpec,
    pub index: CellIndex,
    pub cache: HistCache,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Open a stored container and index it against `grid`
    pub fn open(
        token: String,
        path: &Path,
        upload_name: String,
        grid: GridSpec,
        cache_capacity: usize,
    ) -> histstore::Result<Self> {
        let file = Arc::new(HistFile::open(path)?);
        let index = build_index(&file, &grid)?;

        Ok(Self {
            token,
            path: path.to_path_buf(),
            upload_name,
            grid,
            index,
            cache: HistCache::new(file, cache_capacity),
            created_at: Utc::now(),
        })
    }

    /// Base name of the stored file
    pub fn stored_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Token -> session map shared by all handlers
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh opaque session token
    pub fn new_token() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .insert(session.token.clone(), Arc::clone(&session));
        session
    }

    pub fn get(&self, token: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use histstore::{ContainerWriter, Histogram, IndexStrategy};
    use tempfile::TempDir;

    #[test]
    fn test_open_and_register() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.hgrid");
        let mut writer = ContainerWriter::new();
        writer
            .add_histogram(
                "h_ieta1_iphi1",
                &Histogram::uniform("h", 0.0, 1.0, vec![1.0]).unwrap(),
            )
            .unwrap();
        writer.finish(&path).unwrap();

        let token = SessionRegistry::new_token();
        let session = Session::open(
            token.clone(),
            &path,
            "run42.hgrid".to_string(),
            GridSpec::default(),
            8,
        )
        .unwrap();
        assert_eq!(session.stored_name(), "abc.hgrid");
        assert_eq!(session.index.strategy(), IndexStrategy::ByName);

        let registry = SessionRegistry::new();
        assert_eq!(registry.len(), 0);
        registry.insert(session);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&token).unwrap().upload_name, "run42.hgrid");
        assert!(registry.get("other").is_none());
    }

    #[test]
    fn test_tokens_unique() {
        assert_ne!(SessionRegistry::new_token(), SessionRegistry::new_token());
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.hgrid");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let result = Session::open(
            "t".to_string(),
            &path,
            "bad".to_string(),
            GridSpec::default(),
            8,
        );
        assert!(result.is_err());
    }
}
