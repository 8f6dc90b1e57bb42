//! The two artifacts under edit and the shared "current target" context.
//!
//! A target surface (a site) owns one stylesheet and one behavior script.
//! Tools that read and tools that save must agree on which site they act
//! on, so they share an `ArtifactContext` that the caller sets before a run.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Which of the two artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Style code
    Css,
    /// Behavior code
    Js,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Js => "js",
        }
    }

    /// File name used by file-backed stores.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Css => "style.css",
            Self::Js => "behavior.js",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The surface whose artifacts are being edited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactTarget {
    /// Site key, e.g. "news.ycombinator.com"
    pub site: String,
}

impl ArtifactTarget {
    pub fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }
}

/// Shared, externally owned pointer to the current target.
///
/// Set once before a run; the loop and tools only read it.
#[derive(Debug, Default)]
pub struct ArtifactContext {
    current: RwLock<Option<ArtifactTarget>>,
}

impl ArtifactContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(target: ArtifactTarget) -> Self {
        Self {
            current: RwLock::new(Some(target)),
        }
    }

    /// Point every tool at a new target.
    pub fn set(&self, target: ArtifactTarget) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(target);
    }

    pub fn clear(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Snapshot of the current target.
    pub fn current(&self) -> Option<ArtifactTarget> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_starts_empty() {
        let ctx = ArtifactContext::new();
        assert!(ctx.current().is_none());
    }

    #[test]
    fn context_set_and_clear() {
        let ctx = ArtifactContext::new();
        ctx.set(ArtifactTarget::new("example.com"));
        assert_eq!(ctx.current().unwrap().site, "example.com");
        ctx.clear();
        assert!(ctx.current().is_none());
    }

    #[test]
    fn kind_names() {
        assert_eq!(ArtifactKind::Css.to_string(), "css");
        assert_eq!(ArtifactKind::Js.file_name(), "behavior.js");
    }
}
