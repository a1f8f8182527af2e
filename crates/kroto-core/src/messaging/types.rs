use crate::domain::MessageId;

/// Options for an outgoing notice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to: Option<MessageId>,
    /// Deliver without a notification sound.
    pub silent: bool,
}

impl SendOptions {
    pub fn silent_reply(to: MessageId) -> Self {
        Self {
            reply_to: Some(to),
            silent: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// A user's standing in a channel, as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipStatus {
    Member,
    Administrator,
    Owner,
    Restricted,
    Left,
    Banned,
    Unknown,
}

impl MembershipStatus {
    /// Member, administrator and owner count as subscribed.
    pub fn is_subscribed(self) -> bool {
        matches!(
            self,
            MembershipStatus::Member | MembershipStatus::Administrator | MembershipStatus::Owner
        )
    }
}
