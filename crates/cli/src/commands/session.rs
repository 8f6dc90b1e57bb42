//! Wiring shared by the commands: store, tools, provider, loop controller.

use std::sync::Arc;
use std::time::Duration;
use stylesmith_agent::{ConversationState, LoopController, build_system_prompt};
use stylesmith_config::{AppConfig, StorageBackend};
use stylesmith_core::artifact::{ArtifactContext, ArtifactTarget};
use stylesmith_core::event::EventBus;
use stylesmith_core::limits::SizePolicy;
use stylesmith_core::provider::Provider;
use stylesmith_core::tool::ToolRegistry;
use stylesmith_tools::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore, default_registry};

/// Everything a chat needs for one site.
pub struct Session {
    pub controller: LoopController,
    pub state: ConversationState,
    pub events: Arc<EventBus>,
    pub target: ArtifactTarget,
    pub provider_name: String,
}

pub fn build_store(config: &AppConfig) -> Arc<dyn ArtifactStore> {
    match config.storage.backend {
        StorageBackend::File => Arc::new(FileArtifactStore::new(&config.storage.path)),
        StorageBackend::Memory => Arc::new(InMemoryArtifactStore::new()),
    }
}

pub fn build_registry(config: &AppConfig, store: Arc<dyn ArtifactStore>, context: Arc<ArtifactContext>) -> ToolRegistry {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.provider.timeout_secs))
        .user_agent(concat!("stylesmith/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    default_registry(store, context, http_client)
}

/// Build a session around an already constructed provider.
pub fn build_session(config: &AppConfig, site: &str, provider: Arc<dyn Provider>) -> Session {
    let target = ArtifactTarget::new(site);
    let context = Arc::new(ArtifactContext::with_target(target.clone()));
    let store = build_store(config);
    let registry = build_registry(config, store, context);

    let prompt = build_system_prompt(config.system_prompt_override.as_deref(), &registry);
    let policy = SizePolicy::from_settings(config);
    let state = ConversationState::new(prompt, policy, config.conversation.max_iterations);

    let events = Arc::new(EventBus::default());
    let provider_name = provider.name().to_string();
    let controller = LoopController::new(provider, &config.provider.model, Arc::new(registry), events.clone())
        .with_temperature(config.provider.temperature)
        .with_max_tokens(config.provider.max_tokens)
        .with_critical_tools(config.conversation.critical_tools.iter().cloned());

    Session {
        controller,
        state,
        events,
        target,
        provider_name,
    }
}
