//! BoxAgent -- object-safe dynamic dispatch wrapper for Agent.
//!
//! 1. Define an object-safe `AgentDyn` trait with boxed futures
//! 2. Blanket-impl `AgentDyn` for all `T: Agent`
//! 3. `BoxAgent` wraps `Box<dyn AgentDyn>` and delegates

use futures_util::future::BoxFuture;

use super::contract::{Agent, AgentCapabilities, AgentContext, AgentResult};

/// Object-safe version of [`Agent`] with boxed futures.
pub trait AgentDyn: Send + Sync {
    fn agent_type(&self) -> &str;

    fn capabilities(&self) -> AgentCapabilities;

    fn execute_boxed<'a>(&'a self, ctx: &'a AgentContext) -> BoxFuture<'a, AgentResult>;
}

impl<T: Agent> AgentDyn for T {
    fn agent_type(&self) -> &str {
        Agent::agent_type(self)
    }

    fn capabilities(&self) -> AgentCapabilities {
        Agent::capabilities(self)
    }

    fn execute_boxed<'a>(&'a self, ctx: &'a AgentContext) -> BoxFuture<'a, AgentResult> {
        Box::pin(self.execute(ctx))
    }
}

/// Type-erased agent for the registry.
///
/// `Agent` uses RPITIT so it cannot be a trait object directly.
pub struct BoxAgent {
    inner: Box<dyn AgentDyn>,
}

impl BoxAgent {
    pub fn new<T: Agent + 'static>(agent: T) -> Self {
        Self {
            inner: Box::new(agent),
        }
    }

    pub fn agent_type(&self) -> &str {
        self.inner.agent_type()
    }

    pub fn capabilities(&self) -> AgentCapabilities {
        self.inner.capabilities()
    }

    pub async fn execute(&self, ctx: &AgentContext) -> AgentResult {
        self.inner.execute_boxed(ctx).await
    }
}

impl std::fmt::Debug for BoxAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAgent")
            .field("agent_type", &self.agent_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_types::workflow::JsonMap;
    use serde_json::json;
    use std::time::Duration;

    struct EchoAgent;

    impl Agent for EchoAgent {
        fn agent_type(&self) -> &str {
            "echo"
        }

        fn capabilities(&self) -> AgentCapabilities {
            AgentCapabilities::new("echo", "returns its config")
        }

        async fn execute(&self, ctx: &AgentContext) -> AgentResult {
            AgentResult::success(ctx.config.clone(), Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_box_agent_delegates() {
        let agent = BoxAgent::new(EchoAgent);
        assert_eq!(agent.agent_type(), "echo");
        assert_eq!(agent.capabilities().description, "returns its config");

        let mut config = JsonMap::new();
        config.insert("k".to_string(), json!("v"));
        let result = agent.execute(&AgentContext::new(JsonMap::new(), config)).await;
        assert!(result.success);
        assert_eq!(result.outputs["k"], json!("v"));
    }
}
