//! Built-in tool implementations for stylesmith.
//!
//! Tools give the agent the ability to act on the site it customizes:
//! read and save the stylesheet and userscript of the current site, and
//! fetch pages to inspect their markup.

pub mod artifact;
pub mod fetch_url;
pub mod store;

use std::sync::Arc;
use stylesmith_core::artifact::ArtifactContext;
use stylesmith_core::tool::ToolRegistry;

pub use artifact::{GetArtifactTool, SaveArtifactTool, check_delimiters};
pub use fetch_url::FetchUrlTool;
pub use store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore, sanitize_site};

/// Names of the tools whose failure should end a run by default.
pub const DEFAULT_CRITICAL_TOOLS: [&str; 2] = ["save_css", "save_js"];

/// Create a registry with all built-in tools sharing one store and target.
pub fn default_registry(
    store: Arc<dyn ArtifactStore>,
    context: Arc<ArtifactContext>,
    http_client: reqwest::Client,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(GetArtifactTool::css(store.clone(), context.clone())));
    registry.register(Box::new(GetArtifactTool::js(store.clone(), context.clone())));
    registry.register(Box::new(SaveArtifactTool::css(store.clone(), context.clone())));
    registry.register(Box::new(SaveArtifactTool::js(store, context)));
    registry.register(Box::new(FetchUrlTool::new(http_client)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry(
            Arc::new(InMemoryArtifactStore::new()),
            Arc::new(ArtifactContext::new()),
            reqwest::Client::new(),
        );
        assert_eq!(
            registry.names(),
            vec!["fetch_url", "get_css", "get_js", "save_css", "save_js"]
        );
        assert_eq!(registry.is_write("save_css"), Some(true));
        assert_eq!(registry.is_write("get_js"), Some(false));
        for name in DEFAULT_CRITICAL_TOOLS {
            assert!(registry.contains(name));
        }
    }
}
