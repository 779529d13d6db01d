use anyhow::{Context, Result};
use medic_runtime::{build_system_prompt, LLMClient, MedicConfig, Orchestrator, ReasoningBackend};
use medic_tools::{
    AuditTrail, CommandDispatcher, CommandRunner, Platform, SafetyClassifier, ShellRunner,
    SkillRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything the front end needs, wired once at startup.
pub struct Components {
    pub registry: Arc<SkillRegistry>,
    pub classifier: Arc<SafetyClassifier>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub audit: Arc<AuditTrail>,
    pub orchestrator: Arc<Orchestrator>,
    pub model: String,
}

/// Wire the production backend and shell runner.
pub fn build(config: &MedicConfig) -> Result<Components> {
    let backend = LLMClient::new(
        config.backend.endpoint.clone(),
        config.backend.model.clone(),
        config.backend.max_retries,
    )
    .with_api_key(config.backend.api_key());

    if config.backend.api_key().is_none() {
        info!("No API key configured, calling backend without authorization");
    }

    build_with(config, Arc::new(backend), Arc::new(ShellRunner))
}

/// Wire with an arbitrary backend and runner.
pub fn build_with(
    config: &MedicConfig,
    backend: Arc<dyn ReasoningBackend>,
    runner: Arc<dyn CommandRunner>,
) -> Result<Components> {
    let registry = Arc::new(config.registry().context("Failed to build skill registry")?);
    let platform = Platform::current();
    let audit = Arc::new(AuditTrail::new());
    let classifier = Arc::new(SafetyClassifier::new(registry.clone()));
    let dispatcher = Arc::new(CommandDispatcher::new(
        runner,
        audit.clone(),
        config.dispatch,
    ));

    let system_prompt = build_system_prompt(&config.instructions, &registry, platform);
    let orchestrator = Orchestrator::new(
        backend,
        classifier.clone(),
        dispatcher.clone(),
        audit.clone(),
        system_prompt,
    )
    .with_platform(platform)
    .with_idle_timeout(Duration::from_secs(config.idle_timeout_secs));

    info!(
        "Loaded {} skills for {} (model {})",
        registry.count(),
        platform,
        config.backend.model
    );

    Ok(Components {
        registry,
        classifier,
        dispatcher,
        audit,
        orchestrator: Arc::new(orchestrator),
        model: config.backend.model.clone(),
    })
}
