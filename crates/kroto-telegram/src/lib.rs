//! Telegram adapter (teloxide).
//!
//! Implements the `kroto-core` messaging and membership ports over the Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ParseMode, Recipient},
    ApiError, RequestError,
};

use tokio::time::sleep;

pub mod convert;
pub mod router;

use kroto_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::{MembershipPort, MessagingPort},
        types::{DeleteOutcome, MembershipStatus, SendOptions},
    },
    subscription::ChannelRequirement,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn tg_recipient(channel: &ChannelRequirement) -> Result<Recipient> {
        match channel {
            ChannelRequirement::Handle(handle) => Ok(Recipient::ChannelUsername(handle.clone())),
            ChannelRequirement::Id(id) => Ok(Recipient::Id(teloxide::types::ChatId(*id))),
            ChannelRequirement::Malformed(raw) => Err(Error::Config(format!(
                "malformed channel reference: {raw}"
            ))),
        }
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Run a request, waiting out one `RetryAfter` before giving up.
    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

pub(crate) fn membership_status(kind: &ChatMemberKind) -> MembershipStatus {
    match kind {
        ChatMemberKind::Owner { .. } => MembershipStatus::Owner,
        ChatMemberKind::Administrator { .. } => MembershipStatus::Administrator,
        ChatMemberKind::Member { .. } => MembershipStatus::Member,
        ChatMemberKind::Restricted { .. } => MembershipStatus::Restricted,
        ChatMemberKind::Left { .. } => MembershipStatus::Left,
        ChatMemberKind::Banned { .. } => MembershipStatus::Banned,
    }
}

/// A message that is already gone counts as done, not as a failure.
pub(crate) fn delete_outcome<T>(
    res: std::result::Result<T, RequestError>,
) -> Result<DeleteOutcome> {
    match res {
        Ok(_) => Ok(DeleteOutcome::Deleted),
        Err(RequestError::Api(ApiError::MessageToDeleteNotFound)) => Ok(DeleteOutcome::AlreadyGone),
        Err(e) => Err(TelegramMessenger::map_err(e)),
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_html(
        &self,
        chat_id: ChatId,
        html: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let mut req = self
                    .bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_notification(opts.silent);
                if let Some(reply_to) = opts.reply_to {
                    req = req
                        .reply_to_message_id(Self::tg_msg_id(reply_to))
                        .allow_sending_without_reply(true);
                }
                req
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<DeleteOutcome> {
        let res = self
            .with_retry(|| {
                self.bot
                    .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            })
            .await;
        delete_outcome(res)
    }
}

#[async_trait]
impl MembershipPort for TelegramMessenger {
    async fn fetch_chat_membership(
        &self,
        channel: &ChannelRequirement,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        let recipient = Self::tg_recipient(channel)?;
        let user = u64::try_from(user_id.0)
            .map(teloxide::types::UserId)
            .map_err(|_| Error::External(format!("invalid user id {}", user_id.0)))?;

        let member = self
            .with_retry(|| self.bot.get_chat_member(recipient.clone(), user))
            .await
            .map_err(Self::map_err)?;

        Ok(membership_status(&member.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_kinds_map_onto_statuses() {
        assert_eq!(
            membership_status(&ChatMemberKind::Member),
            MembershipStatus::Member
        );
        assert_eq!(
            membership_status(&ChatMemberKind::Left),
            MembershipStatus::Left
        );
        assert!(!membership_status(&ChatMemberKind::Left).is_subscribed());
    }

    #[test]
    fn missing_message_counts_as_already_gone() {
        assert_eq!(delete_outcome(Ok(true)).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(
            delete_outcome::<bool>(Err(RequestError::Api(ApiError::MessageToDeleteNotFound)))
                .unwrap(),
            DeleteOutcome::AlreadyGone
        );
    }

    #[test]
    fn other_delete_failures_stay_errors() {
        let err = delete_outcome::<bool>(Err(RequestError::Api(ApiError::MessageCantBeDeleted)))
            .unwrap_err();
        assert!(matches!(err, Error::External(_)));
    }

    #[test]
    fn recipients_follow_channel_form() {
        assert_eq!(
            TelegramMessenger::tg_recipient(&ChannelRequirement::parse("@news")).unwrap(),
            Recipient::ChannelUsername("@news".to_string())
        );
        assert_eq!(
            TelegramMessenger::tg_recipient(&ChannelRequirement::parse("1234")).unwrap(),
            Recipient::Id(teloxide::types::ChatId(-1001234))
        );
        assert!(
            TelegramMessenger::tg_recipient(&ChannelRequirement::parse("nope nope")).is_err()
        );
    }
}
