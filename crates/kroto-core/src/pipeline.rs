//! The moderation pipeline: evaluate a message, then carry out the verdict.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::Config,
    dispatch::MessageHandler,
    domain::Message,
    executor::ActionExecutor,
    lists::ListStore,
    messaging::port::{MembershipPort, MessagingPort},
    rules::{Action, RuleEngine},
    subscription::SubscriptionChecker,
    Result,
};

pub struct Moderator {
    engine: RuleEngine,
    executor: Arc<ActionExecutor>,
}

impl Moderator {
    pub fn new(engine: RuleEngine, executor: Arc<ActionExecutor>) -> Self {
        Self { engine, executor }
    }

    /// Wire the engine and executor from runtime configuration.
    pub fn from_config(
        cfg: &Config,
        lists: Arc<ListStore>,
        messenger: Arc<dyn MessagingPort>,
        membership: Arc<dyn MembershipPort>,
    ) -> Self {
        let channels = cfg.channels();
        let engine = RuleEngine::new(
            lists,
            SubscriptionChecker::new(membership),
            Arc::clone(&channels),
        );
        let executor = ActionExecutor::new(messenger, cfg.executor_config(), channels);
        Self::new(engine, Arc::new(executor))
    }

    pub fn executor(&self) -> &Arc<ActionExecutor> {
        &self.executor
    }

    pub async fn moderate(&self, msg: &Message) -> Result<Action> {
        let action = self.engine.evaluate(msg).await;
        self.executor.execute(msg, action.clone()).await?;
        Ok(action)
    }
}

#[async_trait]
impl MessageHandler for Moderator {
    async fn handle_message(&self, msg: Message) -> Result<()> {
        self.moderate(&msg).await.map(|_| ())
    }
}
