use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{DeleteOutcome, MembershipStatus, SendOptions},
    subscription::ChannelRequirement,
    Result,
};

/// Outbound messaging the moderation pipeline needs: warn, then delete.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_html(&self, chat_id: ChatId, html: &str, opts: SendOptions)
        -> Result<MessageRef>;

    /// `Ok(AlreadyGone)` when the target no longer exists; `Err` for real failures.
    async fn delete_message(&self, msg: MessageRef) -> Result<DeleteOutcome>;
}

/// Channel membership lookups used by the subscription gate.
#[async_trait]
pub trait MembershipPort: Send + Sync {
    async fn fetch_chat_membership(
        &self,
        channel: &ChannelRequirement,
        user_id: UserId,
    ) -> Result<MembershipStatus>;
}
