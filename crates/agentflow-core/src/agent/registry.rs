//! Agent registry for type-id lookup.
//!
//! Built once at process start and shared behind an `Arc`. There is no
//! registration after construction.

use std::collections::HashMap;

use super::box_agent::BoxAgent;
use super::contract::AgentCapabilities;

/// Immutable mapping from agent type identifier to capability instance.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: HashMap<String, BoxAgent>,
}

impl AgentRegistry {
    /// Build a registry. A later agent with the same type replaces an earlier one.
    pub fn new(agents: Vec<BoxAgent>) -> Self {
        let mut map = HashMap::with_capacity(agents.len());
        for agent in agents {
            let agent_type = agent.agent_type().to_string();
            if map.insert(agent_type.clone(), agent).is_some() {
                tracing::warn!(agent_type = %agent_type, "duplicate agent type, keeping the last one");
            }
        }
        Self { agents: map }
    }

    pub fn get(&self, agent_type: &str) -> Option<&BoxAgent> {
        self.agents.get(agent_type)
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type)
    }

    /// Capabilities of every registered agent, sorted by type.
    pub fn list(&self) -> Vec<AgentCapabilities> {
        let mut caps: Vec<_> = self.agents.values().map(BoxAgent::capabilities).collect();
        caps.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
        caps
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
