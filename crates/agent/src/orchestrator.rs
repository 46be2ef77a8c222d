//! Concrete agents built on [`AgentLoop`].

use std::sync::Arc;

use async_trait::async_trait;
use fieldagent_config::AppConfig;
use fieldagent_core::agent::{Agent, AgentRequest};
use fieldagent_core::chunk::ChunkStream;
use fieldagent_core::context::ExecutionContext;
use fieldagent_core::event::EventBus;
use fieldagent_core::provider::Provider;
use fieldagent_core::tool::ToolRegistry;

use crate::loop_runner::AgentLoop;
use crate::prompt::{Capabilities, SystemPrompt};

/// The mapping assistant: area, distance, geocoding and screenshot tools
/// behind a capability-aware system prompt.
pub struct MappingOrchestrator {
    agent_loop: AgentLoop,
    persona: Option<String>,
}

impl MappingOrchestrator {
    /// Build the orchestrator with the standard mapping tools.
    pub fn new(provider: Arc<dyn Provider>, config: &AppConfig) -> fieldagent_core::Result<Self> {
        let tools = fieldagent_tools::mapping_registry(&config.geocoder)?;
        Ok(Self::with_tools(provider, tools, config))
    }

    /// Build the orchestrator around an explicit tool registry.
    pub fn with_tools(provider: Arc<dyn Provider>, tools: ToolRegistry, config: &AppConfig) -> Self {
        Self {
            agent_loop: AgentLoop::from_config(provider, Arc::new(tools), config),
            persona: config.agent.persona.clone(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.agent_loop = self.agent_loop.with_event_bus(event_bus);
        self
    }

    pub fn agent_loop(&self) -> &AgentLoop {
        &self.agent_loop
    }

    /// The system prompt a request with this context would be sent with.
    pub fn system_prompt(&self, ctx: &ExecutionContext) -> String {
        let prompt = SystemPrompt::new(Capabilities::from_context(ctx));
        match &self.persona {
            Some(persona) => prompt.with_base(persona.clone()).build(),
            None => prompt.build(),
        }
    }
}

#[async_trait]
impl Agent for MappingOrchestrator {
    fn name(&self) -> &str {
        "mapping_orchestrator"
    }

    fn tools(&self) -> &ToolRegistry {
        self.agent_loop.tools()
    }

    async fn stream(&self, request: AgentRequest) -> ChunkStream {
        let system = match &request.context {
            Some(ctx) => self.system_prompt(ctx),
            None => self.system_prompt(&ExecutionContext::default()),
        };
        self.agent_loop.run(system, request)
    }
}

/// Restricts an agent to callers on a paid plan.
///
/// Reads the `plan` key of the execution context. Callers check
/// [`Agent::can_execute`] before streaming; the wrapped agent's loop does not
/// re-check it.
pub struct PremiumGate<A> {
    inner: A,
    plans: Vec<String>,
}

impl<A: Agent> PremiumGate<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            plans: vec!["premium".into(), "enterprise".into()],
        }
    }

    /// Replace the plans that are allowed through.
    pub fn with_plans(mut self, plans: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.plans = plans.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

#[async_trait]
impl<A: Agent> Agent for PremiumGate<A> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn tools(&self) -> &ToolRegistry {
        self.inner.tools()
    }

    fn can_execute(&self, ctx: &ExecutionContext) -> bool {
        let entitled = ctx
            .get("plan")
            .and_then(|p| p.as_str())
            .is_some_and(|plan| self.plans.iter().any(|allowed| allowed == plan));
        entitled && self.inner.can_execute(ctx)
    }

    async fn stream(&self, request: AgentRequest) -> ChunkStream {
        self.inner.stream(request).await
    }
}
