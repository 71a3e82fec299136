//! Built-in agents.

pub mod http;
pub mod transform;

use agentflow_core::agent::{AgentRegistry, BoxAgent};

pub use http::HttpAgent;
pub use transform::TransformAgent;

/// Every built-in agent, boxed for registration.
pub fn builtin_agents() -> Vec<BoxAgent> {
    vec![
        BoxAgent::new(HttpAgent::new()),
        BoxAgent::new(TransformAgent::new()),
    ]
}

/// Registry holding the built-ins plus any `extra` agents.
///
/// An extra agent with a built-in's type replaces the built-in.
pub fn default_registry(extra: Vec<BoxAgent>) -> AgentRegistry {
    let mut agents = builtin_agents();
    agents.extend(extra);
    AgentRegistry::new(agents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_lists_builtins() {
        let registry = default_registry(Vec::new());
        let types: Vec<String> = registry.list().into_iter().map(|c| c.agent_type).collect();
        assert_eq!(types, vec!["http".to_string(), "transform".to_string()]);
        assert!(registry.contains("http"));
    }
}
