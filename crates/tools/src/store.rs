//! Artifact persistence: where the stylesheet and behavior script live.
//!
//! Two backends:
//! - `InMemoryArtifactStore` for tests and throwaway sessions
//! - `FileArtifactStore` writing `<root>/<site>/style.css` and `<root>/<site>/behavior.js`

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use stylesmith_core::artifact::{ArtifactKind, ArtifactTarget};
use stylesmith_core::error::ToolError;
use tokio::sync::RwLock;
use tracing::debug;

/// Load and save the two artifacts of a target.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Backend name, for logging.
    fn backend(&self) -> &str;

    /// The stored code, or `None` if nothing was saved yet.
    async fn load(&self, target: &ArtifactTarget, kind: ArtifactKind) -> Result<Option<String>, ToolError>;

    /// Replace the stored code.
    async fn save(&self, target: &ArtifactTarget, kind: ArtifactKind, code: &str) -> Result<(), ToolError>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<HashMap<(String, ArtifactKind), String>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn load(&self, target: &ArtifactTarget, kind: ArtifactKind) -> Result<Option<String>, ToolError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(target.site.clone(), kind)).cloned())
    }

    async fn save(&self, target: &ArtifactTarget, kind: ArtifactKind, code: &str) -> Result<(), ToolError> {
        let mut entries = self.entries.write().await;
        entries.insert((target.site.clone(), kind), code.to_string());
        Ok(())
    }
}

/// One directory per site under a root directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an artifact file; rejects site keys that cannot be made safe.
    pub fn artifact_path(&self, target: &ArtifactTarget, kind: ArtifactKind) -> Result<PathBuf, ToolError> {
        let dir = sanitize_site(&target.site)?;
        Ok(self.root.join(dir).join(kind.file_name()))
    }
}

/// Map a site key onto a single safe path component.
///
/// Keeps `[A-Za-z0-9._-]`, replaces anything else with `_`, and rejects
/// empty keys and keys made only of dots.
pub fn sanitize_site(site: &str) -> Result<String, ToolError> {
    let cleaned: String = site
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(ToolError::Storage(format!("Invalid site key: '{site}'")));
    }
    Ok(cleaned)
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    fn backend(&self) -> &str {
        "file"
    }

    async fn load(&self, target: &ArtifactTarget, kind: ArtifactKind) -> Result<Option<String>, ToolError> {
        let path = self.artifact_path(target, kind)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(code) => Ok(Some(code)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ToolError::Storage(format!("Failed to read {}: {e}", path.display()))),
        }
    }

    async fn save(&self, target: &ArtifactTarget, kind: ArtifactKind, code: &str) -> Result<(), ToolError> {
        let path = self.artifact_path(target, kind)?;

        // Ensure the site directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ToolError::Storage(format!("Failed to create directory {}: {e}", parent.display()))
            })?;
        }

        tokio::fs::write(&path, code)
            .await
            .map_err(|e| ToolError::Storage(format!("Failed to write {}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = code.len(), "Artifact saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> ArtifactTarget {
        ArtifactTarget::new("news.ycombinator.com")
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = InMemoryArtifactStore::new();
        assert_eq!(store.load(&site(), ArtifactKind::Css).await.unwrap(), None);
        store.save(&site(), ArtifactKind::Css, "a { color: red; }").await.unwrap();
        assert_eq!(
            store.load(&site(), ArtifactKind::Css).await.unwrap().as_deref(),
            Some("a { color: red; }")
        );
        // Kinds are stored separately
        assert_eq!(store.load(&site(), ArtifactKind::Js).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_store_writes_per_site_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(&site(), ArtifactKind::Js, "console.log(1);").await.unwrap();

        let path = dir.path().join("news.ycombinator.com").join("behavior.js");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "console.log(1);");
        assert_eq!(
            store.load(&site(), ArtifactKind::Js).await.unwrap().as_deref(),
            Some("console.log(1);")
        );
        assert_eq!(store.load(&site(), ArtifactKind::Css).await.unwrap(), None);
    }

    #[test]
    fn sanitize_blocks_traversal() {
        assert_eq!(sanitize_site("../../etc").unwrap(), ".._.._etc");
        assert_eq!(sanitize_site("Example.COM:8080").unwrap(), "example.com_8080");
        assert!(sanitize_site("..").is_err());
        assert!(sanitize_site("   ").is_err());
    }

    #[test]
    fn artifact_path_stays_under_root() {
        let store = FileArtifactStore::new("/data/artifacts");
        let path = store
            .artifact_path(&ArtifactTarget::new("../../etc/passwd"), ArtifactKind::Css)
            .unwrap();
        assert!(path.starts_with("/data/artifacts"));
        assert_eq!(path.components().count(), Path::new("/data/artifacts").components().count() + 2);
    }
}
