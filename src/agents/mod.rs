//! Trading agents
//!
//! Every agent implements `AgentDecider`. The orchestrator only ever calls
//! `decide()`; agents hold no round state of their own.

pub mod grok;
pub mod llm_trader;
pub mod momentum;
pub mod traits;

pub use grok::{ChatOptions, GrokClient, GrokMessage};
pub use llm_trader::GrokTrader;
pub use momentum::{MomentumConfig, MomentumTrader};
pub use traits::AgentDecider;

use std::sync::Arc;
use tracing::warn;

use crate::config::{AgentKind, AppConfig};
use crate::error::Result;

/// Build the registered agents, in configuration order
pub fn build_agents(config: &AppConfig) -> Result<Vec<Arc<dyn AgentDecider>>> {
    let mut grok: Option<Arc<GrokClient>> = None;
    let mut agents: Vec<Arc<dyn AgentDecider>> = Vec::with_capacity(config.agents.len());

    for settings in &config.agents {
        let agent: Arc<dyn AgentDecider> = match settings.kind {
            AgentKind::Momentum => Arc::new(MomentumTrader::from_settings(settings, &config.risk)),
            AgentKind::Grok => {
                let client = match &grok {
                    Some(c) => c.clone(),
                    None => {
                        let c = Arc::new(GrokClient::new(config.grok.clone())?);
                        if !c.is_configured() {
                            warn!(
                                agent_id = %settings.id,
                                "Grok API key not configured; this agent will fail every round"
                            );
                        }
                        grok = Some(c.clone());
                        c
                    }
                };
                Arc::new(GrokTrader::new(settings, client, &config.risk))
            }
        };
        agents.push(agent);
    }

    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_default_agents_in_order() {
        let agents = build_agents(&AppConfig::default()).unwrap();
        let ids: Vec<_> = agents.iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids, vec!["momentum-1", "grok-1"]);
        assert_eq!(agents[1].name(), "Grok");
    }
}
