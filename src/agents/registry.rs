//! Agent registry (C6) — per-(user, kind, mode) cache of agent instances.
//!
//! Local to one orchestrator instance; never shared across requests, so a
//! cached agent always carries this request's context snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::agents::{Agent, AgentKind, Mode};
use crate::context::AgentContext;
use crate::llm::LlmProvider;
use crate::store::Database;

pub struct AgentRegistry {
    db: Arc<dyn Database>,
    llm: Arc<dyn LlmProvider>,
    text_window: usize,
    voice_window: usize,
    agents: RwLock<HashMap<(Uuid, AgentKind, Mode), Arc<Agent>>>,
}

impl AgentRegistry {
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LlmProvider>,
        text_window: usize,
        voice_window: usize,
    ) -> Self {
        Self {
            db,
            llm,
            text_window,
            voice_window,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the cached agent or build one bound to `ctx`.
    pub async fn get_or_create(
        &self,
        kind: AgentKind,
        mode: Mode,
        ctx: Arc<AgentContext>,
        onboarding_mode: bool,
    ) -> Arc<Agent> {
        let key = (ctx.user_id(), kind, mode);
        if let Some(agent) = self.agents.read().await.get(&key) {
            return Arc::clone(agent);
        }

        let agent = Arc::new(Agent::new(
            kind,
            ctx,
            Arc::clone(&self.db),
            Arc::clone(&self.llm),
            onboarding_mode,
            self.text_window,
            self.voice_window,
        ));
        self.agents
            .write()
            .await
            .insert(key, Arc::clone(&agent));
        agent
    }

    pub async fn cached_count(&self) -> usize {
        self.agents.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextLoader;
    use crate::llm::ScriptedLlm;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn cache_key_includes_kind_and_mode() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let user_id = Uuid::new_v4();
        db.register_user(user_id, "Reg").await.unwrap();
        let ctx = ContextLoader::new(Arc::clone(&db), 10)
            .load(user_id, false, true)
            .await
            .unwrap();

        let registry = AgentRegistry::new(
            db,
            Arc::new(ScriptedLlm::new()) as Arc<dyn LlmProvider>,
            10,
            4,
        );

        let a = registry
            .get_or_create(AgentKind::Workout, Mode::Text, Arc::clone(&ctx), true)
            .await;
        let b = registry
            .get_or_create(AgentKind::Workout, Mode::Text, Arc::clone(&ctx), true)
            .await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.cached_count().await, 1);

        registry
            .get_or_create(AgentKind::Workout, Mode::Voice, Arc::clone(&ctx), true)
            .await;
        registry
            .get_or_create(AgentKind::Diet, Mode::Text, ctx, true)
            .await;
        assert_eq!(registry.cached_count().await, 3);
    }
}
